use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;

use image::Rgba;
use tessera_config::{AtlasConfig, Config};

use super::*;
use crate::decoder::decode_bytes;
use crate::index::TilePlacement;
use crate::uv::texel_at;

/// Decoder that synthesizes a solid 16x16 tile per path and counts calls.
///
/// Paths containing `missing` fail; paths listed in `slow` sleep first and
/// paths listed in `panicking` panic inside the decode future.
#[derive(Default)]
struct MockDecoder {
    calls: AtomicUsize,
    per_source: Mutex<HashMap<String, usize>>,
    failing: Mutex<Vec<String>>,
    slow: Mutex<Vec<String>>,
    translucent: Mutex<Vec<String>>,
    panicking: Mutex<Vec<String>>,
}

impl MockDecoder {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn calls_for(&self, needle: &str) -> usize {
        let map = self.per_source.lock().unwrap();
        map.iter()
            .filter(|(k, _)| k.contains(needle))
            .map(|(_, n)| n)
            .sum()
    }

    fn set_failing(&self, needle: &str, failing: bool) {
        let mut list = self.failing.lock().unwrap();
        if failing {
            list.push(needle.to_string());
        } else {
            list.retain(|n| n != needle);
        }
    }
}

fn colour_for(desc: &str) -> Rgba<u8> {
    let h = desc
        .bytes()
        .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
    let [r, g, b, _] = h.to_le_bytes();
    Rgba([r, g, b, 255])
}

impl ImageDecoder for MockDecoder {
    fn decode(&self, source: TextureSource) -> BoxFuture<'static, Result<RgbaImage, DecodeError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let desc = source.describe();
        *self.per_source.lock().unwrap().entry(desc.clone()).or_default() += 1;

        let fails = desc.contains("missing")
            || self.failing.lock().unwrap().iter().any(|n| desc.contains(n.as_str()));
        let slow = self.slow.lock().unwrap().iter().any(|n| desc.contains(n.as_str()));
        let panics = self
            .panicking
            .lock()
            .unwrap()
            .iter()
            .any(|n| desc.contains(n.as_str()));
        let translucent = self
            .translucent
            .lock()
            .unwrap()
            .iter()
            .any(|n| desc.contains(n.as_str()));

        async move {
            if slow {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if panics {
                panic!("decoder bug");
            }
            if let TextureSource::Bytes(bytes) = &source {
                return decode_bytes(bytes);
            }
            if let TextureSource::DataUri(uri) = &source {
                let bytes = crate::key::decode_data_uri(uri).map_err(DecodeError::MalformedDataUri)?;
                return decode_bytes(&bytes);
            }
            if fails {
                return Err(DecodeError::Io {
                    path: desc,
                    source: Arc::new(std::io::Error::from(std::io::ErrorKind::NotFound)),
                });
            }
            let mut colour = colour_for(&desc);
            if translucent {
                colour.0[3] = 128;
            }
            Ok(RgbaImage::from_pixel(16, 16, colour))
        }
        .boxed()
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.loader.publish_debounce_ms = 0;
    config
}

async fn atlas_context(config: Config) -> (TextureContext, Arc<MockDecoder>) {
    let decoder = Arc::new(MockDecoder::default());
    let ctx = TextureContext::new(config, decoder.clone(), SurfaceCapabilities::atlas_only());
    ctx.initialize().await.unwrap();
    (ctx, decoder)
}

fn png(colour: Rgba<u8>) -> Arc<[u8]> {
    let img = RgbaImage::from_pixel(8, 8, colour);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner().into()
}

#[tokio::test]
async fn test_initialize_loads_builtin_placeholder() {
    let (ctx, decoder) = atlas_context(test_config()).await;
    assert!(ctx.is_ready());
    assert_eq!(decoder.calls(), 0, "builtin placeholder needs no decoder");
    let placeholder = ctx.get_texture_metadata(BUILTIN_ERROR_TEXTURE).unwrap();
    assert!(ctx.is_placeholder(BUILTIN_ERROR_TEXTURE));
    assert!(!placeholder.is_transparent);
    assert!(ctx.snapshot().generation >= 1);
}

#[tokio::test]
async fn test_initialization_fails_without_placeholder() {
    let mut config = test_config();
    config.loader.error_texture = "textures/missing_error.png".to_string();
    let ctx = TextureContext::new(
        config,
        Arc::new(MockDecoder::default()),
        SurfaceCapabilities::atlas_only(),
    );
    let err = ctx.initialize().await.unwrap_err();
    assert!(matches!(err, LoadError::Initialization { .. }));
    assert!(!ctx.is_ready());
}

#[tokio::test]
async fn test_essential_keys_loaded_before_ready() {
    let mut config = test_config();
    config.loader.essential = vec!["blocks/stone/+y.png".to_string()];
    let (ctx, _) = atlas_context(config).await;
    let record = ctx.get_texture_metadata("blocks/stone/+y.png").unwrap();
    assert!(!ctx.is_placeholder("blocks/stone/+y.png"));
    assert_eq!(record.source_key, "blocks/stone/+y.png");
}

#[tokio::test]
async fn test_first_tile_uv_covers_interior() {
    let mut config = test_config();
    config.loader.error_texture = "textures/error.png".to_string();
    let decoder = Arc::new(MockDecoder::default());
    let ctx = TextureContext::new(config, decoder, SurfaceCapabilities::atlas_only());
    ctx.initialize().await.unwrap();

    let record = ctx.get_texture_metadata("textures/error.png").unwrap();
    let TilePlacement::Atlas { rect, padding } = record.placement else {
        panic!("expected atlas placement");
    };
    assert_eq!((rect.x, rect.y, rect.width, rect.height, padding), (0, 0, 20, 20, 2));

    let lo = ctx.get_texture_uv_coordinate("textures/error.png", Vec2::ZERO);
    let hi = ctx.get_texture_uv_coordinate("textures/error.png", Vec2::ONE);
    let (lo_u, lo_v) = (2.0 / 512.0, 1.0 - 18.0 / 512.0);
    let (hi_u, hi_v) = (18.0 / 512.0, 1.0 - 2.0 / 512.0);
    assert!((lo.u - lo_u).abs() < 1e-6 && (lo.v - lo_v).abs() < 1e-6, "{lo:?}");
    assert!((hi.u - hi_u).abs() < 1e-6 && (hi.v - hi_v).abs() < 1e-6, "{hi:?}");
    assert_eq!(lo.layer, None);
}

#[tokio::test]
async fn test_concurrent_loads_decode_once() {
    let (ctx, decoder) = atlas_context(test_config()).await;
    decoder.slow.lock().unwrap().push("dirt".to_string());

    let (a, b, c) = tokio::join!(
        ctx.load_texture("blocks/dirt/+y.png"),
        ctx.load_texture("blocks/dirt/+y.png"),
        ctx.load_texture("https://cdn.example/assets/blocks/dirt/top.png"),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(decoder.calls_for("dirt"), 1);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(ctx.stats().in_flight, 0);
}

#[tokio::test]
async fn test_alias_equivalence() {
    let (ctx, _) = atlas_context(test_config()).await;
    let record = ctx.load_texture("assets/blocks/grass/+y.png").await.unwrap();
    for key in ["blocks/grass/+y.png", "blocks/grass", "blocks/grass/top.png", "blocks/grass/TOP.png"] {
        let found = ctx.get_texture_metadata(key).unwrap();
        assert!(Arc::ptr_eq(&found, &record), "{key}");
    }

    // A face without its own texture resolves through the bare block path.
    let side = ctx.get_texture_uv_coordinate("blocks/grass/+x.png", Vec2::splat(0.5));
    let top = ctx.get_texture_uv_coordinate("blocks/grass/+y.png", Vec2::splat(0.5));
    assert_eq!(side, top);
}

#[tokio::test]
async fn test_missing_key_falls_back_then_fails() {
    let (ctx, decoder) = atlas_context(test_config()).await;
    let placeholder_uv = ctx.get_texture_uv_coordinate(BUILTIN_ERROR_TEXTURE, Vec2::splat(0.25));

    let first = ctx.get_texture_uv_coordinate("blocks/unknown_missing/+y.png", Vec2::splat(0.25));
    assert_eq!(first, placeholder_uv);
    ctx.wait_idle().await;

    assert_eq!(ctx.missing_textures(), vec!["blocks/unknown_missing/+y.png".to_string()]);
    assert!(ctx.is_placeholder("blocks/unknown_missing/+y.png"));
    assert_eq!(ctx.stats().failed, 1);

    // Deterministic fallback, and no automatic retry.
    for _ in 0..3 {
        let again = ctx.get_texture_uv_coordinate("blocks/unknown_missing/+y.png", Vec2::splat(0.25));
        assert_eq!(again, placeholder_uv);
    }
    let record = ctx.load_texture("blocks/unknown_missing/+y.png").await.unwrap();
    assert!(ctx.is_placeholder(&record.source_key));
    ctx.wait_idle().await;
    assert_eq!(decoder.calls_for("unknown_missing"), 1);
}

#[tokio::test]
async fn test_queued_key_becomes_indexed() {
    let (ctx, _) = atlas_context(test_config()).await;
    let before = ctx.get_texture_uv_coordinate("blocks/sand/+y.png", Vec2::ZERO);
    let placeholder = ctx.get_texture_uv_coordinate(BUILTIN_ERROR_TEXTURE, Vec2::ZERO);
    assert_eq!(before, placeholder);

    ctx.wait_idle().await;
    assert!(ctx.get_texture_metadata("blocks/sand/+y.png").is_some());
    assert!(!ctx.is_placeholder("blocks/sand/+y.png"));
    assert_ne!(ctx.get_texture_uv_coordinate("blocks/sand/+y.png", Vec2::ZERO), placeholder);
}

#[tokio::test]
async fn test_queue_deduplicates_and_continues_after_failure() {
    let (ctx, decoder) = atlas_context(test_config()).await;
    for key in [
        "blocks/a/+x.png",
        "blocks/missing_b/+x.png",
        "blocks/a/+x.png",
        "blocks/c/+x.png",
    ] {
        ctx.queue_texture_for_loading(key);
    }
    ctx.wait_idle().await;
    assert_eq!(decoder.calls(), 3);
    assert!(!ctx.is_placeholder("blocks/a/+x.png"));
    assert!(ctx.is_placeholder("blocks/missing_b/+x.png"));
    assert!(!ctx.is_placeholder("blocks/c/+x.png"));
    assert_eq!(ctx.stats().pending, 0);
}

#[tokio::test]
async fn test_retry_missing_textures() {
    let (ctx, decoder) = atlas_context(test_config()).await;
    decoder.set_failing("flaky", true);
    ctx.load_texture("blocks/flaky/+x.png").await.unwrap();
    assert!(ctx.is_placeholder("blocks/flaky/+x.png"));

    decoder.set_failing("flaky", false);
    assert_eq!(ctx.retry_missing_textures(), 1);
    ctx.wait_idle().await;

    assert!(!ctx.is_placeholder("blocks/flaky/+x.png"));
    assert!(ctx.missing_textures().is_empty());
    assert_eq!(ctx.stats().failed, 0);
    assert_eq!(decoder.calls_for("flaky"), 2);
}

#[tokio::test]
async fn test_growth_keeps_first_tile_content() {
    let mut config = test_config();
    // Batch publishes so the surface is not copied on every insert.
    config.loader.publish_debounce_ms = 60_000;
    let (ctx, _) = atlas_context(config).await;
    let first = "blocks/first/+y.png";
    ctx.load_texture(first).await.unwrap();
    ctx.rebuild_atlas();

    let sample = Vec2::splat(0.5);
    let before_dims = ctx.stats().dimensions;
    let before_uv = ctx.get_texture_uv_coordinate(first, sample);
    let before_snapshot = ctx.snapshot();
    let before_colour = before_snapshot.pixel_at(before_uv).unwrap();

    let keys: Vec<String> = (0..2000).map(|i| format!("blocks/b{i}/+x.png")).collect();
    let results = futures::future::join_all(keys.iter().map(|k| ctx.load_texture(k))).await;
    assert!(results.iter().all(Result::is_ok));
    ctx.rebuild_atlas();

    let stats = ctx.stats();
    assert_ne!(stats.dimensions, before_dims, "2000 tiles must grow a 512px atlas");
    assert_eq!(stats.tiles, 2002);

    let after_uv = ctx.get_texture_uv_coordinate(first, sample);
    assert_eq!(
        texel_at(after_uv, stats.dimensions),
        texel_at(before_uv, before_dims)
    );
    assert_eq!(ctx.snapshot().pixel_at(after_uv), Some(before_colour));
    assert_eq!(before_snapshot.extent().0, before_dims.0);
}

#[tokio::test]
async fn test_no_overlap_between_indexed_tiles() {
    let (ctx, _) = atlas_context(test_config()).await;
    let keys: Vec<String> = (0..300).map(|i| format!("blocks/n{i}")).collect();
    futures::future::join_all(keys.iter().map(|k| ctx.load_texture(k))).await;

    let mut records: Vec<Arc<TileRecord>> = ctx.entries().into_iter().map(|(_, r)| r).collect();
    records.sort_by_key(|r| r.id);
    records.dedup_by_key(|r| r.id);
    let rects: Vec<_> = records
        .iter()
        .map(|r| match r.placement {
            TilePlacement::Atlas { rect, .. } => rect,
            TilePlacement::Layer { .. } => panic!("atlas backend"),
        })
        .collect();
    for (i, a) in rects.iter().enumerate() {
        for b in &rects[i + 1..] {
            assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
        }
    }
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let (ctx, _) = atlas_context(test_config()).await;
    for key in ["blocks/x/+y.png", "blocks/y/-z.png", "custom:4"] {
        ctx.load_texture(key).await.unwrap();
    }
    let offsets = [Vec2::ZERO, Vec2::splat(0.3), Vec2::ONE];
    let collect = |ctx: &TextureContext| -> Vec<TexCoord> {
        ["blocks/x/+y.png", "blocks/y/-z.png", "custom:4"]
            .iter()
            .flat_map(|k| offsets.iter().map(move |o| (*k, *o)))
            .map(|(k, o)| ctx.get_texture_uv_coordinate(k, o))
            .collect()
    };

    let g1 = ctx.rebuild_atlas();
    let first = collect(&ctx);
    let g2 = ctx.rebuild_atlas();
    let second = collect(&ctx);
    assert_eq!(first, second);
    assert_eq!(g2, g1 + 1);
}

#[tokio::test]
async fn test_uv_cache_hits_and_invalidation() {
    let (ctx, _) = atlas_context(test_config()).await;
    ctx.load_texture("blocks/ore/+y.png").await.unwrap();
    let offset = Vec2::new(0.25, 0.75);
    let a = ctx.get_texture_uv_coordinate("blocks/ore/+y.png", offset);
    let b = ctx.get_texture_uv_coordinate("blocks/ore/+y.png", offset);
    assert_eq!(a, b);
    let stats = ctx.stats();
    assert_eq!(stats.uv_cache_hits, 1);

    ctx.rebuild_atlas();
    ctx.get_texture_uv_coordinate("blocks/ore/+y.png", offset);
    assert_eq!(ctx.stats().uv_cache_hits, 1);
}

#[tokio::test]
async fn test_custom_texture_all_faces_and_clear() {
    let (ctx, _) = atlas_context(test_config()).await;
    let record = ctx
        .apply_custom_texture(
            "12",
            CustomTexture::Bytes(png(Rgba([200, 10, 10, 255]))),
            ApplyOptions {
                all_faces: true,
                rebuild: true,
            },
        )
        .await
        .unwrap();

    for key in ["12", "custom:12", "blocks/12", "blocks/12/+x.png", "blocks/12/back.png"] {
        let found = ctx.get_texture_metadata(key).unwrap();
        assert!(Arc::ptr_eq(&found, &record), "{key}");
    }
    let coord = ctx.get_texture_uv_coordinate("blocks/12/-y.png", Vec2::splat(0.5));
    assert_eq!(ctx.snapshot().pixel_at(coord), Some(Rgba([200, 10, 10, 255])));

    let before = ctx.stats();
    assert_eq!(before.bound_tiles, before.tiles);
    assert_eq!(ctx.clear_custom_textures_for_block("12"), 8);
    let after = ctx.stats();
    assert_eq!(after.tiles, before.tiles);
    assert_eq!(after.bound_tiles, before.bound_tiles - 1);
    assert!(ctx.get_texture_metadata("custom:12").is_none());
    assert!(ctx.get_texture_metadata("blocks/12/+x.png").is_none());
    assert_eq!(ctx.clear_custom_textures_for_block("12"), 0);
}

#[tokio::test]
async fn test_custom_texture_overrides_existing_binding() {
    let (ctx, _) = atlas_context(test_config()).await;
    let original = ctx.load_texture("blocks/log/+z.png").await.unwrap();

    use base64::Engine;
    let uri = format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png(Rgba([0, 0, 255, 100])))
    );
    let replaced = ctx
        .apply_custom_texture("blocks/log/front.png", CustomTexture::DataUri(uri), ApplyOptions::default())
        .await
        .unwrap();

    assert_ne!(original.id, replaced.id);
    let found = ctx.get_texture_metadata("blocks/log/+z.png").unwrap();
    assert!(Arc::ptr_eq(&found, &replaced));
    assert!(ctx.is_texture_transparent("blocks/log/+z.png"));
}

#[tokio::test]
async fn test_custom_texture_supersedes_in_flight_load() {
    let (ctx, decoder) = atlas_context(test_config()).await;
    decoder.slow.lock().unwrap().push("chest".to_string());

    let background = ctx.clone();
    let load = tokio::spawn(async move { background.load_texture("blocks/chest/+y.png").await });
    tokio::task::yield_now().await;
    assert_eq!(ctx.stats().in_flight, 1);

    let custom = ctx
        .apply_custom_texture(
            "blocks/chest/+y.png",
            CustomTexture::Bytes(png(Rgba([1, 2, 3, 255]))),
            ApplyOptions::default(),
        )
        .await
        .unwrap();

    let stale = load.await.unwrap();
    assert!(matches!(stale, Err(LoadError::Superseded { .. })));
    let bound = ctx.get_texture_metadata("blocks/chest/+y.png").unwrap();
    assert!(Arc::ptr_eq(&bound, &custom));
}

#[tokio::test]
async fn test_all_faces_override_supersedes_in_flight_face_load() {
    let (ctx, decoder) = atlas_context(test_config()).await;
    decoder.slow.lock().unwrap().push("blocks/12/+x".to_string());
    decoder.set_failing("blocks/12/+x", true);

    let background = ctx.clone();
    let load = tokio::spawn(async move { background.load_texture("blocks/12/+x.png").await });
    tokio::task::yield_now().await;
    assert_eq!(ctx.stats().in_flight, 1);

    let custom = ctx
        .apply_custom_texture(
            "12",
            CustomTexture::Bytes(png(Rgba([9, 8, 7, 255]))),
            ApplyOptions {
                all_faces: true,
                rebuild: false,
            },
        )
        .await
        .unwrap();

    let stale = load.await.unwrap();
    assert!(matches!(stale, Err(LoadError::Superseded { .. })));
    let bound = ctx.get_texture_metadata("blocks/12/+x.png").unwrap();
    assert!(Arc::ptr_eq(&bound, &custom));
    assert!(ctx.missing_textures().is_empty());
    assert_eq!(ctx.stats().failed, 0);
}

#[tokio::test]
async fn test_panicking_decoder_releases_the_key() {
    let (ctx, decoder) = atlas_context(test_config()).await;
    decoder.panicking.lock().unwrap().push("boom".to_string());

    let record = ctx.load_texture("blocks/boom/+y.png").await.unwrap();
    assert!(ctx.is_placeholder("blocks/boom/+y.png"));
    assert_eq!(record.source_key, BUILTIN_ERROR_TEXTURE);
    let stats = ctx.stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.failed, 1);
    assert_eq!(ctx.missing_textures(), vec!["blocks/boom/+y.png".to_string()]);
    tokio::time::timeout(Duration::from_secs(5), ctx.wait_idle())
        .await
        .unwrap();

    decoder.panicking.lock().unwrap().clear();
    assert_eq!(ctx.retry_missing_textures(), 1);
    tokio::time::timeout(Duration::from_secs(5), ctx.wait_idle())
        .await
        .unwrap();
    assert!(!ctx.is_placeholder("blocks/boom/+y.png"));
    assert_eq!(ctx.stats().in_flight, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rebuilds_publish_in_order() {
    let mut config = test_config();
    config.loader.publish_debounce_ms = 1;
    let (ctx, _) = atlas_context(config).await;
    let mut rx = ctx.subscribe();

    let mut tasks = Vec::new();
    for worker in 0..4 {
        let ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            let mut generations = Vec::new();
            for i in 0..25 {
                ctx.load_texture(&format!("blocks/w{worker}_{i}/+y.png")).await.unwrap();
                generations.push(ctx.rebuild_atlas());
            }
            generations
        }));
    }
    let mut generations = Vec::new();
    for task in tasks {
        let mine = task.await.unwrap();
        assert!(mine.windows(2).all(|w| w[0] < w[1]));
        generations.extend(mine);
    }
    generations.sort_unstable();
    let total = generations.len();
    generations.dedup();
    assert_eq!(generations.len(), total);

    ctx.wait_idle().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let last = ctx.rebuild_atlas();
    let snapshot = rx.borrow_and_update().clone();
    assert!(snapshot.generation >= last);
    let (width, height, _) = snapshot.extent();
    assert_eq!((width, height), ctx.stats().dimensions);
}

#[tokio::test]
async fn test_custom_texture_decode_error_is_returned() {
    let (ctx, _) = atlas_context(test_config()).await;
    let err = ctx
        .apply_custom_texture(
            "blocks/bad/+y.png",
            CustomTexture::Bytes(Arc::from(&b"nope"[..])),
            ApplyOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Decode { .. }));
    assert!(ctx.get_texture_metadata("blocks/bad/+y.png").is_none());
}

#[tokio::test]
async fn test_atlas_space_exhaustion_is_isolated() {
    let mut config = test_config();
    config.atlas = AtlasConfig {
        initial_size: 32,
        max_size: 32,
        ..AtlasConfig::default()
    };
    let (ctx, _) = atlas_context(config).await;

    let err = ctx.load_texture("blocks/big/+y.png").await.unwrap_err();
    assert!(err.is_space_exhausted());
    assert!(ctx.get_texture_metadata("blocks/big/+y.png").is_none());

    let placeholder = ctx.get_texture_uv_coordinate(BUILTIN_ERROR_TEXTURE, Vec2::ZERO);
    assert_eq!(ctx.get_texture_uv_coordinate("blocks/big/+y.png", Vec2::ZERO), placeholder);
    assert!(matches!(
        ctx.load_texture("blocks/big/+y.png").await,
        Err(LoadError::PreviouslyFailed { .. })
    ));
}

#[tokio::test]
async fn test_layer_backend_contract() {
    let mut config = test_config();
    config.atlas.max_layers = 3;
    let decoder = Arc::new(MockDecoder::default());
    let ctx = TextureContext::new(config, decoder, SurfaceCapabilities::with_texture_arrays(64));
    ctx.initialize().await.unwrap();
    assert_eq!(ctx.stats().backend, BackendKind::TextureArray);

    let record = ctx.load_texture("blocks/glass/+y.png").await.unwrap();
    assert_eq!(
        record.placement,
        TilePlacement::Layer {
            layer: 1,
            texture_size: 16
        }
    );
    let coord = ctx.get_texture_uv_coordinate("blocks/glass", Vec2::new(0.25, 0.5));
    assert_eq!((coord.u, coord.v, coord.layer), (0.25, 0.5, Some(1)));

    ctx.load_texture("blocks/b/+y.png").await.unwrap();
    let err = ctx.load_texture("blocks/c/+y.png").await.unwrap_err();
    assert!(matches!(
        err,
        LoadError::TextureSpaceExhausted {
            source: AllocError::LayersExhausted { max_layers: 3 },
            ..
        }
    ));
    let placeholder = ctx.get_texture_uv_coordinate(BUILTIN_ERROR_TEXTURE, Vec2::ZERO);
    assert_eq!(placeholder.layer, Some(0));
    assert_eq!(ctx.get_texture_uv_coordinate("blocks/c/+y.png", Vec2::ZERO), placeholder);
}

#[tokio::test]
async fn test_transparency_flag() {
    let (ctx, decoder) = atlas_context(test_config()).await;
    decoder.translucent.lock().unwrap().push("water".to_string());
    ctx.load_texture("blocks/water/+y.png").await.unwrap();
    ctx.load_texture("blocks/stone/+y.png").await.unwrap();
    assert!(ctx.is_texture_transparent("blocks/water"));
    assert!(!ctx.is_texture_transparent("blocks/stone/+y.png"));
    assert!(!ctx.is_texture_transparent("blocks/never_loaded"));
}

#[tokio::test]
async fn test_block_remap_rewrites_keys() {
    let (ctx, decoder) = atlas_context(test_config()).await;
    let mut remap = BlockRemap::new();
    remap.insert("grass", "100");
    ctx.set_block_remap(remap);

    let record = ctx.load_texture("blocks/grass/+y.png").await.unwrap();
    assert_eq!(record.source_key, "blocks/100/+y.png");
    assert!(ctx.get_texture_metadata("blocks/100").is_some());
    // Bytes still come from the original path.
    assert_eq!(decoder.calls_for("blocks/grass/+y.png"), 1);
}

#[tokio::test]
async fn test_subscribers_see_debounced_publish() {
    let mut config = test_config();
    config.loader.publish_debounce_ms = 5;
    let (ctx, _) = atlas_context(config).await;
    let mut rx = ctx.subscribe();
    let _ = rx.borrow_and_update();

    let keys: Vec<String> = (0..10).map(|i| format!("blocks/p{i}")).collect();
    futures::future::join_all(keys.iter().map(|k| ctx.load_texture(k))).await;

    let coord = ctx.get_texture_uv_coordinate("blocks/p9", Vec2::splat(0.5));
    let expected = Some(colour_for("assets/blocks/p9"));
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            rx.changed().await.unwrap();
            if rx.borrow_and_update().pixel_at(coord) == expected {
                break;
            }
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_mark_essential_after_ready_queues() {
    let (ctx, _) = atlas_context(test_config()).await;
    ctx.mark_texture_as_essential("blocks/late/+y.png");
    ctx.wait_idle().await;
    assert!(!ctx.is_placeholder("blocks/late/+y.png"));
}

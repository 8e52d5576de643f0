//! Mask compositor scenarios: degenerate whole-tile water masks fall back
//! to the tile alpha channel, empty floors produce empty bundles, and tile
//! textures load once across recompositions.

mod common;

use common::{MockHost, headless_gpu};
use tilefx::host::{Floor, TileDoc};
use tilefx::masks::{MaskCompositor, MaskKind};

const SIZE: u32 = 64;

fn tile(id: &str, albedo: &str) -> TileDoc {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "albedoPath": albedo,
        "x": 0.0, "y": 0.0,
        "width": SIZE as f64, "height": SIZE as f64,
        "elevation": 0.0,
    }))
    .unwrap()
}

fn half_alpha_image() -> image::RgbaImage {
    image::RgbaImage::from_fn(SIZE, SIZE, |x, _| {
        if x < SIZE / 2 {
            image::Rgba([200, 200, 200, 255])
        } else {
            image::Rgba([200, 200, 200, 0])
        }
    })
}

#[test]
fn whole_tile_water_mask_substitutes_tile_alpha() {
    let Some(gpu) = headless_gpu() else { return };
    let mut host = MockHost::new([SIZE, SIZE]);
    host.tiles = vec![tile("pond", "maps/pond.webp")];
    // The water mask covers the whole tile (> 98%); the albedo alpha only
    // covers the left half.
    host.images.insert(
        "maps/pond_Water.webp".into(),
        image::RgbaImage::from_pixel(SIZE, SIZE, image::Rgba([255, 255, 255, 255])),
    );
    host.images.insert("maps/pond.webp".into(), half_alpha_image());
    host.listings.insert(
        "maps".into(),
        vec!["pond.webp".into(), "pond_water.webp".into()],
    );

    let mut masks = MaskCompositor::new(&gpu.ctx);
    let floor = Floor { index: 0, bottom: 0.0, top: 10.0 };
    masks.compose_floor(&gpu.ctx, &host, &floor).unwrap();

    let pixels = masks
        .cpu_pixels(&gpu.ctx, 0, MaskKind::Water)
        .expect("water mask composed")
        .to_vec();
    let sample = |x: u32, y: u32| pixels[((y * SIZE + x) * 4) as usize];

    // Substituted mask follows the albedo alpha, not the blanket file.
    assert!(sample(SIZE / 4, SIZE / 2) > 200, "left should be covered");
    assert!(sample(3 * SIZE / 4, SIZE / 2) < 30, "right should be empty");
}

#[test]
fn partial_water_mask_is_used_as_authored() {
    let Some(gpu) = headless_gpu() else { return };
    let mut host = MockHost::new([SIZE, SIZE]);
    host.tiles = vec![tile("shore", "maps/shore.webp")];
    // Water only on the right half: well under the degenerate threshold.
    host.images.insert(
        "maps/shore_Water.webp".into(),
        image::RgbaImage::from_fn(SIZE, SIZE, |x, _| {
            if x >= SIZE / 2 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        }),
    );
    host.images.insert(
        "maps/shore.webp".into(),
        image::RgbaImage::from_pixel(SIZE, SIZE, image::Rgba([255, 255, 255, 255])),
    );
    host.listings.insert(
        "maps".into(),
        vec!["shore.webp".into(), "shore_water.webp".into()],
    );

    let mut masks = MaskCompositor::new(&gpu.ctx);
    let floor = Floor { index: 0, bottom: 0.0, top: 10.0 };
    masks.compose_floor(&gpu.ctx, &host, &floor).unwrap();

    let pixels = masks
        .cpu_pixels(&gpu.ctx, 0, MaskKind::Water)
        .expect("water mask composed")
        .to_vec();
    let sample = |x: u32| pixels[((SIZE / 2 * SIZE + x) * 4) as usize];
    assert!(sample(SIZE / 4) < 30, "left has no water");
    assert!(sample(3 * SIZE / 4) > 200, "right has water");
}

#[test]
fn floor_without_tiles_yields_empty_bundle() {
    let Some(gpu) = headless_gpu() else { return };
    let host = MockHost::new([SIZE, SIZE]);
    let mut masks = MaskCompositor::new(&gpu.ctx);
    let floor = Floor { index: 2, bottom: 20.0, top: 30.0 };
    let bundle = masks.compose_floor(&gpu.ctx, &host, &floor).unwrap();
    assert!(bundle.empty);
    assert!(masks.cpu_pixels(&gpu.ctx, 2, MaskKind::Outdoors).is_none());
}

#[test]
fn recomposition_reuses_loaded_textures() {
    let Some(gpu) = headless_gpu() else { return };
    let mut host = MockHost::new([SIZE, SIZE]);
    host.tiles = vec![tile("a", "maps/a.webp")];
    host.images.insert(
        "maps/a.webp".into(),
        image::RgbaImage::from_pixel(SIZE, SIZE, image::Rgba([255, 255, 255, 255])),
    );
    host.listings.insert("maps".into(), vec!["a.webp".into()]);

    let mut masks = MaskCompositor::new(&gpu.ctx);
    let floor = Floor { index: 0, bottom: 0.0, top: 10.0 };
    masks.compose_floor(&gpu.ctx, &host, &floor).unwrap();
    let loads_after_first = host.texture_loads.get();
    assert!(loads_after_first >= 1);

    // Unchanged inputs: the cached bundle is reused outright.
    masks.compose_floor(&gpu.ctx, &host, &floor).unwrap();
    assert_eq!(host.texture_loads.get(), loads_after_first);

    // Invalidation recomposes, but tile textures stay cached by URL.
    masks.invalidate_floor(0);
    masks.compose_floor(&gpu.ctx, &host, &floor).unwrap();
    assert_eq!(host.texture_loads.get(), loads_after_first);
}

#[test]
fn failed_texture_loads_exclude_the_tile_but_compose_the_rest() {
    let Some(gpu) = headless_gpu() else { return };
    let mut host = MockHost::new([SIZE, SIZE]);
    host.tiles = vec![tile("ok", "maps/ok.webp"), tile("broken", "maps/broken.webp")];
    host.images.insert(
        "maps/ok.webp".into(),
        image::RgbaImage::from_pixel(SIZE, SIZE, image::Rgba([255, 255, 255, 255])),
    );
    // "maps/broken.webp" has no image: the load fails.
    host.listings
        .insert("maps".into(), vec!["ok.webp".into(), "broken.webp".into()]);

    let mut masks = MaskCompositor::new(&gpu.ctx);
    let floor = Floor { index: 0, bottom: 0.0, top: 10.0 };
    let bundle = masks.compose_floor(&gpu.ctx, &host, &floor).unwrap();
    assert!(!bundle.empty, "the surviving tile still composes");
    assert!(bundle.has(MaskKind::FloorAlpha));
}

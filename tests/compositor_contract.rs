use crt_reveal::compositor::{vignette_stops, FrameCompositor, BORDER_WIDTH};
use crt_reveal::frame::{FrameBuffer, TRANSPARENT_BLACK};
use crt_reveal::timeline::Phase;

const SIZE: u32 = 100;

fn rgb(compositor: &FrameCompositor, x: u32, y: u32) -> [u8; 3] {
    let data = compositor.surface_rgba();
    let idx = ((y * compositor.width() + x) * 4) as usize;
    [data[idx], data[idx + 1], data[idx + 2]]
}

fn gray(level: u8) -> FrameBuffer {
    let mut buffer = FrameBuffer::new(SIZE, SIZE);
    buffer.clear([level, level, level, 255]);
    buffer
}

#[test]
fn vignette_is_invisible_at_zero_fade() {
    let mut compositor = FrameCompositor::new(SIZE, SIZE).expect("surface");
    compositor.compose(&gray(180), None, Phase::FadeOut, 0.0, (0, 0));
    assert_eq!(rgb(&compositor, 50, 50), [180, 180, 180]);
    assert_eq!(rgb(&compositor, 20, 50), [180, 180, 180]);
}

#[test]
fn full_fade_hides_the_primary_buffer() {
    let mut compositor = FrameCompositor::new(SIZE, SIZE).expect("surface");
    compositor.compose(&gray(255), None, Phase::FadeOut, 1.0, (0, 0));
    assert!(compositor
        .surface_rgba()
        .chunks_exact(4)
        .all(|px| px == [0, 0, 0, 255]));

    let stops = vignette_stops(1.0);
    assert_eq!(stops.first().map(|stop| stop.1), Some(0.0));
    assert_eq!(stops.last().map(|stop| stop.1), Some(0.9));
}

#[test]
fn vignette_darkens_towards_the_edges() {
    let mut compositor = FrameCompositor::new(SIZE, SIZE).expect("surface");
    compositor.compose(&gray(200), None, Phase::FadeOut, 0.5, (0, 0));
    let center = rgb(&compositor, 50, 50)[0];
    let ring = rgb(&compositor, 20, 50)[0];
    assert!((99..=101).contains(&center), "center {center}");
    assert!(ring < center, "ring {ring} center {center}");
}

#[test]
fn overlay_is_source_over_and_transparent_where_empty() {
    let mut compositor = FrameCompositor::new(SIZE, SIZE).expect("surface");
    let mut overlay = FrameBuffer::new(SIZE, SIZE);
    overlay.clear(TRANSPARENT_BLACK);
    overlay.set_pixel(60, 60, [0, 255, 0, 255]);
    overlay.set_pixel(61, 60, [0, 255, 0, 128]);

    compositor.compose(&gray(100), Some(&overlay), Phase::Signature, 0.0, (0, 0));
    assert_eq!(rgb(&compositor, 40, 40), [100, 100, 100]);
    assert_eq!(rgb(&compositor, 60, 60), [0, 255, 0]);
    let half = rgb(&compositor, 61, 60);
    assert!((48..=52).contains(&half[0]), "{half:?}");
    assert!((176..=180).contains(&half[1]), "{half:?}");
}

#[test]
fn shake_translates_the_primary_buffer() {
    let mut primary = FrameBuffer::new(SIZE, SIZE);
    for y in 0..SIZE {
        primary.set_pixel(50, y, [255, 255, 255, 255]);
    }
    let mut compositor = FrameCompositor::new(SIZE, SIZE).expect("surface");
    compositor.compose(&primary, None, Phase::Flash, 0.0, (3, -2));
    assert_eq!(rgb(&compositor, 53, 50), [255, 255, 255]);
    assert_eq!(rgb(&compositor, 50, 50), [0, 0, 0]);
}

#[test]
fn border_bands_cover_every_edge() {
    let mut compositor = FrameCompositor::new(SIZE, SIZE).expect("surface");
    compositor.compose(&gray(250), None, Phase::Title, 0.0, (0, 0));
    let inset = BORDER_WIDTH as u32 / 2;
    for (x, y) in [(50, inset), (50, SIZE - 1 - inset), (inset, 50), (SIZE - 1 - inset, 50)] {
        let value = rgb(&compositor, x, y)[0];
        assert!((198..=202).contains(&value), "({x}, {y}) = {value}");
    }
    assert_eq!(rgb(&compositor, 50, 50), [250, 250, 250]);
}

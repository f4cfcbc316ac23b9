use serde::Serialize;

use crate::capture::VIDEO_MAX_WIDTH;
use crate::models::{Action, WindowGeometry};

/// Geometry used to turn model coordinates into screen pixels for one
/// iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScreenInfo {
    pub real_width: u32,
    pub real_height: u32,
    /// Dimensions of the encoded video, after downscaling.
    pub video_width: u32,
    pub video_height: u32,
    pub offset_x: i32,
    pub offset_y: i32,
}

impl ScreenInfo {
    pub fn full_screen(width: u32, height: u32) -> Self {
        Self::from_real(width, height, 0, 0)
    }

    pub fn for_window(geometry: WindowGeometry) -> Self {
        Self::from_real(geometry.w, geometry.h, geometry.x, geometry.y)
    }

    fn from_real(width: u32, height: u32, offset_x: i32, offset_y: i32) -> Self {
        let (video_width, video_height) = scaled_dimensions(width, height, VIDEO_MAX_WIDTH);
        Self {
            real_width: width,
            real_height: height,
            video_width,
            video_height,
            offset_x,
            offset_y,
        }
    }
}

/// Size the encoder produces for a `width`x`height` capture: scaled down to
/// `max_width` if wider, both sides rounded down to even.
pub fn scaled_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let scale = (max_width as f64 / width as f64).min(1.0);
    let even = |side: u32| ((side as f64 * scale) as u32) & !1;
    (even(width), even(height))
}

/// Center of a `[y_min, x_min, y_max, x_max]` box on the 0-1000 scale, in
/// real screen pixels. `None` unless the box has exactly four values.
pub fn map_bbox(bbox: &[i32], screen: &ScreenInfo) -> Option<(i32, i32)> {
    let [y_min, x_min, y_max, x_max] = <[i32; 4]>::try_from(bbox).ok()?;
    let center_x = (x_min as f64 + x_max as f64) / 2.0 / 1000.0;
    let center_y = (y_min as f64 + y_max as f64) / 2.0 / 1000.0;
    // Summed in f64: the float-to-int cast saturates, an i32 add would not.
    let x = (center_x * screen.real_width as f64).round() + screen.offset_x as f64;
    let y = (center_y * screen.real_height as f64).round() + screen.offset_y as f64;
    Some((x as i32, y as i32))
}

/// Fill `x`/`y` from `bbox` on every action that carries one. Coordinates
/// sent by the model directly are dropped.
pub fn scale_actions(actions: &mut [Action], screen: &ScreenInfo) {
    for action in actions.iter_mut() {
        let mapped = action.bbox.as_deref().and_then(|bbox| map_bbox(bbox, screen));
        match mapped {
            Some((x, y)) => {
                action.x = Some(x);
                action.y = Some(y);
            }
            None => {
                action.x = None;
                action.y = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{sanitize, MAX_COORD};
    use crate::models::ActionKind;

    #[test]
    fn full_box_maps_to_center() {
        let screen = ScreenInfo::full_screen(1920, 1080);
        assert_eq!(map_bbox(&[0, 0, 1000, 1000], &screen), Some((960, 540)));
    }

    #[test]
    fn degenerate_box_is_stable() {
        let screen = ScreenInfo::full_screen(1920, 1080);
        let first = map_bbox(&[500, 500, 500, 500], &screen);
        let second = map_bbox(&[500, 500, 500, 500], &screen);
        assert_eq!(first, Some((960, 540)));
        assert_eq!(first, second);
    }

    #[test]
    fn window_offset_is_added() {
        let screen = ScreenInfo::for_window(WindowGeometry::new(100, 200, 800, 600));
        // x: (250+750)/2/1000*800 = 400, y: (0+1000)/2/1000*600 = 300
        assert_eq!(map_bbox(&[0, 250, 1000, 750], &screen), Some((500, 500)));
    }

    #[test]
    fn huge_box_with_offset_saturates() {
        let screen = ScreenInfo::for_window(WindowGeometry::new(100, 200, 1920, 1080));
        let (x, y) = map_bbox(&[0, i32::MAX, 0, i32::MAX], &screen).unwrap();
        assert_eq!((x, y), (i32::MAX, 200));

        let (x, y) = map_bbox(&[i32::MIN, i32::MIN, i32::MIN, i32::MIN], &screen).unwrap();
        assert_eq!((x, y), (i32::MIN, i32::MIN));

        let mut click = Action::new(ActionKind::MouseClick).with_bbox([0, i32::MAX, 0, i32::MAX]);
        scale_actions(std::slice::from_mut(&mut click), &screen);
        let click = sanitize(click);
        assert_eq!((click.x, click.y), (Some(MAX_COORD), Some(200)));
    }

    #[test]
    fn rejects_malformed_boxes() {
        let screen = ScreenInfo::full_screen(1920, 1080);
        assert_eq!(map_bbox(&[1, 2, 3], &screen), None);
        assert_eq!(map_bbox(&[1, 2, 3, 4, 5], &screen), None);
    }

    #[test]
    fn video_dimensions_are_even_and_capped() {
        assert_eq!(scaled_dimensions(1920, 1080, 1280), (1280, 720));
        assert_eq!(scaled_dimensions(801, 601, 1280), (800, 600));
        assert_eq!(scaled_dimensions(2560, 1441, 1280), (1280, 720));
        let info = ScreenInfo::full_screen(1024, 768);
        assert_eq!((info.video_width, info.video_height), (1024, 768));
    }

    #[test]
    fn scale_actions_overwrites_model_coordinates() {
        let screen = ScreenInfo::full_screen(1920, 1080);
        let mut click = Action::new(ActionKind::MouseClick).with_bbox([400, 400, 600, 600]);
        click.x = Some(5);
        let mut stray = Action::new(ActionKind::MouseMove);
        stray.x = Some(10);
        stray.y = Some(10);
        let mut actions = vec![click, stray];

        scale_actions(&mut actions, &screen);

        assert_eq!((actions[0].x, actions[0].y), (Some(960), Some(540)));
        assert_eq!((actions[1].x, actions[1].y), (None, None));
    }
}

use image::Rgb;
use image::Rgba;


/// Blends `fg` over `bg` in place. The foreground alpha is attenuated by
/// `opacity` before the weights are taken; `bg` has no alpha of its own.
pub fn blend_pixel(bg: &mut Rgb<u8>, fg: &Rgba<u8>, opacity: f64) {
    let a = (fg[3] as f64 / 255.0) * opacity;
    // same weights as a*fg + (1-a)*bg, but exact when fg == bg
    let r = bg[0] as f64 + a * (fg[0] as f64 - bg[0] as f64);
    let g = bg[1] as f64 + a * (fg[1] as f64 - bg[1] as f64);
    let b = bg[2] as f64 + a * (fg[2] as f64 - bg[2] as f64);
    // truncating, saturating at 0 and 255
    bg[0] = r as u8;
    bg[1] = g as u8;
    bg[2] = b as u8;
}


#[cfg(test)]
mod test {

    use image::Rgb;
    use image::Rgba;

    use super::blend_pixel;

    #[test]
    fn test_blend_pixel_weights() {
        let mut bg = Rgb::from([0, 0, 0]);
        blend_pixel(&mut bg, &Rgba::from([200, 200, 200, 128]), 1.0);
        assert_eq!(bg, Rgb::from([100, 100, 100]));

        let mut bg = Rgb::from([10, 20, 30]);
        blend_pixel(&mut bg, &Rgba::from([200, 100, 50, 255]), 1.0);
        assert_eq!(bg, Rgb::from([200, 100, 50]));

        let mut bg = Rgb::from([10, 20, 30]);
        blend_pixel(&mut bg, &Rgba::from([200, 100, 50, 255]), 0.0);
        assert_eq!(bg, Rgb::from([10, 20, 30]));

        let mut bg = Rgb::from([100, 100, 100]);
        blend_pixel(&mut bg, &Rgba::from([200, 0, 100, 255]), 0.5);
        assert_eq!(bg, Rgb::from([150, 50, 100]));
    }

    #[test]
    fn test_blend_pixel_out_of_range_opacity() {
        let mut bg = Rgb::from([100, 100, 100]);
        blend_pixel(&mut bg, &Rgba::from([255, 0, 100, 255]), 2.0);
        // 2*255 - 100 and 2*0 - 100 saturate
        assert_eq!(bg, Rgb::from([255, 0, 100]));
    }

    #[test]
    fn test_same_color_is_stable() {
        for alpha in 0 ..= 255u8 {
            for v in 0 ..= 255u8 {
                let mut bg = Rgb::from([v, v, v]);
                blend_pixel(&mut bg, &Rgba::from([v, v, v, alpha]), 0.35);
                assert_eq!(bg, Rgb::from([v, v, v]), "alpha {} value {}", alpha, v);
            }
        }
    }

    #[test]
    fn test_matches_double_precision_weights() {
        for opacity in &[0.35, 0.5, 0.7, 0.1, 1.0] {
            for alpha in 0 ..= 255u8 {
                for fg in (0 ..= 255u8).step_by(5) {
                    for bg in (0 ..= 255u8).step_by(5) {
                        let a = (alpha as f64 / 255.0) * opacity;
                        let expected = a * fg as f64 + (1.0 - a) * bg as f64;
                        let mut px = Rgb::from([bg, bg, bg]);
                        blend_pixel(&mut px, &Rgba::from([fg, fg, fg, alpha]), *opacity);
                        let got = px[0] as f64;
                        // both sums differ by rounding noise only, which can tip
                        // a value sitting on an integer across the truncation
                        if (expected - expected.round()).abs() > 1e-9 {
                            assert_eq!(got, expected.floor(), "opacity {} alpha {} fg {} bg {}", opacity, alpha, fg, bg);
                        } else {
                            let level = expected.round();
                            assert!(got == level || got == level - 1.0, "opacity {} alpha {} fg {} bg {}", opacity, alpha, fg, bg);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_low_alpha_keeps_background() {
        let mut bg = Rgb::from([15, 15, 15]);
        blend_pixel(&mut bg, &Rgba::from([15, 15, 15, 1]), 0.35);
        assert_eq!(bg, Rgb::from([15, 15, 15]));
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::{CpuBackend, HistogramBackend};
    use crate::color::{LayerColors, RgbaColor};
    use crate::gpu::{GpuBackend, GpuContext};
    use crate::histogram::{BarGeometry, HistogramBuffer, DEFAULT_BUFFER_POOL_SIZE, VERTICES_PER_BAR};
    use crate::pipeline::HistogramPipeline;
    use crate::texture::HistogramTexture;
    use crate::types::{EnabledLayers, HistogramLayer, RgblBin};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn cpu_pipeline(bins: u32, is_linear: bool) -> HistogramPipeline<CpuBackend> {
        let mut pipeline = HistogramPipeline::new(CpuBackend::new());
        pipeline.configure(bins, is_linear, LayerColors::default()).unwrap();
        pipeline
    }

    fn solid_bgra(width: u32, height: u32, bgra: [u8; 4]) -> HistogramTexture {
        let data: Vec<u8> = bgra.repeat((width * height) as usize);
        HistogramTexture::from_bgra8(width, height, &data).unwrap()
    }

    fn random_texture(width: u32, height: u32, seed: u64) -> HistogramTexture {
        let mut rng = StdRng::seed_from_u64(seed);
        let data: Vec<u8> = (0..width * height)
            .flat_map(|_| [rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>(), 255])
            .collect();
        HistogramTexture::from_rgba8(width, height, data).unwrap()
    }

    fn bin_index(value: f64, bins: u32) -> usize {
        (value * (bins - 1) as f64).round() as usize
    }

    fn linearize(v: f64) -> f64 {
        if v <= 0.04045 {
            v / 12.92
        } else {
            ((v + 0.055) / 1.055).powf(2.4)
        }
    }

    /// Every bin equals `expected` where listed and is zero elsewhere.
    fn check_histogram(histogram: &HistogramBuffer, expected: &[(usize, RgblBin)]) {
        for index in 0..histogram.bins_count().as_usize() {
            let want = expected
                .iter()
                .filter(|(bin, _)| *bin == index)
                .fold([0u32; 4], |mut acc, (_, counts)| {
                    for (a, c) in acc.iter_mut().zip(counts) {
                        *a += c;
                    }
                    acc
                });
            assert_eq!(histogram.bin(index), Some(want), "bin {}", index);
        }
    }

    /// Hardware adapter first, then the software fallback adapter (llvmpipe, WARP).
    ///
    /// Returns `None` when neither exists, unless `HISTOVIEW_REQUIRE_GPU` is set, in
    /// which case the test fails instead of skipping.
    fn gpu_backend() -> Option<GpuBackend> {
        let hardware = GpuBackend::new();
        let result = hardware.or_else(|e| {
            eprintln!("no hardware adapter ({}), trying the fallback adapter", e);
            GpuContext::blocking_fallback().and_then(GpuBackend::with_context)
        });
        match result {
            Ok(backend) => Some(backend),
            Err(e) if std::env::var_os("HISTOVIEW_REQUIRE_GPU").is_some() => {
                panic!("HISTOVIEW_REQUIRE_GPU is set but no adapter is usable: {}", e)
            }
            Err(e) => {
                eprintln!("skipping GPU test: {}", e);
                None
            }
        }
    }

    #[test]
    fn test_white() {
        let mut pipeline = cpu_pipeline(256, false);
        pipeline
            .process(&solid_bgra(2, 2, [255, 255, 255, 255]), EnabledLayers::ALL)
            .unwrap();
        check_histogram(pipeline.histogram(), &[(255, [4, 4, 4, 4])]);
        assert_eq!(pipeline.max_bin_values().0, [4, 4, 4, 4]);
    }

    #[test]
    fn test_black() {
        for is_linear in [false, true] {
            let mut pipeline = cpu_pipeline(256, is_linear);
            pipeline
                .process(&solid_bgra(2, 2, [0, 0, 0, 255]), EnabledLayers::ALL)
                .unwrap();
            check_histogram(pipeline.histogram(), &[(0, [4, 4, 4, 4])]);
        }
    }

    #[test]
    fn test_gray_gamma_and_linear() {
        let texture = solid_bgra(2, 2, [119, 119, 119, 255]);

        let mut pipeline = cpu_pipeline(256, false);
        pipeline.process(&texture, EnabledLayers::ALL).unwrap();
        check_histogram(pipeline.histogram(), &[(119, [4, 4, 4, 4])]);

        pipeline.configure(256, true, LayerColors::default()).unwrap();
        pipeline.process(&texture, EnabledLayers::ALL).unwrap();
        let linear_bin = bin_index(linearize(119.0 / 255.0), 256);
        assert_eq!(linear_bin, 47);
        check_histogram(pipeline.histogram(), &[(linear_bin, [4, 4, 4, 4])]);
        assert_eq!(pipeline.max_bin_values().0, [4, 4, 4, 4]);
    }

    #[test]
    fn test_pure_rgb() {
        // BGRA: green, blue, red, green
        let texture = HistogramTexture::from_bgra8(
            2,
            2,
            &[0, 255, 0, 255, 255, 0, 0, 255, 0, 0, 255, 255, 0, 255, 0, 255],
        )
        .unwrap();
        let mut pipeline = cpu_pipeline(256, false);
        pipeline.process(&texture, EnabledLayers::ALL).unwrap();

        check_histogram(
            pipeline.histogram(),
            &[
                (0, [3, 2, 3, 0]),
                (255, [1, 2, 1, 0]),
                (bin_index(0.2126, 256), [0, 0, 0, 1]),
                (bin_index(0.7152, 256), [0, 0, 0, 2]),
                (bin_index(0.0722, 256), [0, 0, 0, 1]),
            ],
        );
        assert_eq!(pipeline.max_bin_values().0, [3, 2, 3, 2]);
    }

    #[test]
    fn test_mixed_rgb_gamma() {
        let texture = solid_bgra(2, 2, [157, 150, 60, 255]);
        let mut pipeline = cpu_pipeline(256, false);
        pipeline.process(&texture, EnabledLayers::ALL).unwrap();

        let luminance = 0.2126 * 60.0 / 255.0 + 0.7152 * 150.0 / 255.0 + 0.0722 * 157.0 / 255.0;
        check_histogram(
            pipeline.histogram(),
            &[
                (60, [4, 0, 0, 0]),
                (150, [0, 4, 0, 0]),
                (157, [0, 0, 4, 0]),
                (bin_index(luminance, 256), [0, 0, 0, 4]),
            ],
        );
    }

    #[test]
    fn test_mixed_rgb_linear() {
        let texture = solid_bgra(2, 2, [157, 150, 60, 255]);
        let mut pipeline = cpu_pipeline(256, true);
        pipeline.process(&texture, EnabledLayers::ALL).unwrap();

        let (r, g, b) = (
            linearize(60.0 / 255.0),
            linearize(150.0 / 255.0),
            linearize(157.0 / 255.0),
        );
        let luminance = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        check_histogram(
            pipeline.histogram(),
            &[
                (bin_index(r, 256), [4, 0, 0, 0]),
                (bin_index(g, 256), [0, 4, 0, 0]),
                (bin_index(b, 256), [0, 0, 4, 0]),
                (bin_index(luminance, 256), [0, 0, 0, 4]),
            ],
        );
        assert_eq!(pipeline.max_bin_values().0, [4, 4, 4, 4]);
    }

    #[test]
    fn test_hundred_red_pixels_four_bins_linear() {
        let texture = solid_bgra(10, 10, [0, 0, 255, 255]);
        let mut pipeline = cpu_pipeline(4, true);
        let geometry = pipeline.process(&texture, EnabledLayers::ALL).unwrap();

        let red: Vec<u32> = pipeline.histogram().layer(HistogramLayer::Red).collect();
        assert_eq!(red, vec![0, 0, 0, 100]);
        assert_eq!(pipeline.max_bin_values().get(HistogramLayer::Red), 100);
        assert_eq!(geometry.len(), 4 * 4 * VERTICES_PER_BAR);
    }

    #[test]
    fn test_counts_sum_to_pixel_count() {
        let texture = random_texture(640, 480, 7);
        for (bins, is_linear) in [(256, false), (256, true), (10, false), (1, true), (4096, false)] {
            let mut pipeline = cpu_pipeline(bins, is_linear);
            pipeline.process(&texture, EnabledLayers::ALL).unwrap();
            let histogram = pipeline.histogram();
            let maxima = histogram.max_bin_values();

            for layer in HistogramLayer::ALL {
                assert_eq!(histogram.total(layer), texture.pixel_count() as u64, "{} bins, {}", bins, layer);
                assert!(histogram.layer(layer).all(|count| count <= maxima.get(layer)));
                assert!(histogram.layer(layer).any(|count| count == maxima.get(layer)));
            }
        }
    }

    #[test]
    fn test_blank_texture_yields_zero_histogram() {
        let texture = HistogramTexture::new(16, 16);
        let mut pipeline = cpu_pipeline(64, true);
        let geometry = pipeline.process(&texture, EnabledLayers::ALL).unwrap();

        assert!(pipeline.histogram().is_zero());
        assert_eq!(pipeline.max_bin_values().overall(), 0);
        assert!(geometry
            .vertices()
            .iter()
            .all(|v| v.position[1] == 0.0 && v.position.iter().all(|p| p.is_finite())));
    }

    #[test]
    fn test_same_bins_reconfiguration_keeps_buffer() {
        let mut pipeline = cpu_pipeline(128, false);
        let id = pipeline.histogram().id();

        pipeline
            .configure(128, true, LayerColors::default().with_opacity(0.25))
            .unwrap();
        assert_eq!(pipeline.histogram().id(), id);
        assert!(pipeline.is_linear());

        pipeline.configure(64, true, LayerColors::default()).unwrap();
        assert_ne!(pipeline.histogram().id(), id);
        assert_eq!(pipeline.histogram().cells().len(), 64 * 4);
    }

    #[test]
    fn test_no_data_leaks_between_frames() {
        let mut pipeline = cpu_pipeline(16, false);
        let white = solid_bgra(4, 4, [255, 255, 255, 255]);
        pipeline.process(&white, EnabledLayers::ALL).unwrap();
        let first = pipeline.histogram().id();

        // two more frames cycle through the rest of the pool
        for _ in 1..DEFAULT_BUFFER_POOL_SIZE.get() {
            pipeline.process(&white, EnabledLayers::ALL).unwrap();
        }
        pipeline
            .process(&solid_bgra(1, 1, [0, 0, 0, 255]), EnabledLayers::ALL)
            .unwrap();

        assert_eq!(pipeline.histogram().id(), first);
        check_histogram(pipeline.histogram(), &[(0, [1, 1, 1, 1])]);
        assert_eq!(pipeline.histogram().generation(), 2);
    }

    #[test]
    fn test_disabled_layers_emit_no_vertices() {
        let texture = random_texture(32, 32, 11);
        let mut pipeline = cpu_pipeline(32, false);

        let layers = EnabledLayers::from_flags(true, false, true, false);
        let geometry = pipeline.process(&texture, layers).unwrap();
        assert_eq!(geometry.for_layer(HistogramLayer::Green).count(), 0);
        assert_eq!(geometry.for_layer(HistogramLayer::Luminance).count(), 0);
        assert_eq!(geometry.len(), 2 * 32 * VERTICES_PER_BAR);

        let none = pipeline.process(&texture, EnabledLayers::NONE).unwrap();
        assert_eq!(none, BarGeometry::default());
        // binning still covers every layer
        assert_eq!(pipeline.histogram().total(HistogramLayer::Green), 32 * 32);
    }

    #[test]
    fn test_geometry_heights_are_normalized() {
        let texture = random_texture(64, 64, 3);
        let mut pipeline = cpu_pipeline(50, true);
        let geometry = pipeline.process(&texture, EnabledLayers::ALL).unwrap();

        for layer in HistogramLayer::ALL {
            let tallest = geometry
                .for_layer(layer)
                .map(|v| v.position[1])
                .fold(0.0f32, f32::max);
            assert_eq!(tallest, 1.0, "{}", layer);
        }
        assert!(geometry
            .vertices()
            .iter()
            .all(|v| (0.0..=1.0).contains(&v.position[0]) && (0.0..=1.0).contains(&v.position[1])));
    }

    /// 10 bins drawn into a 10x4 overlay: one pixel column per bin.
    fn render_staircase<B: HistogramBackend>(pipeline: &mut HistogramPipeline<B>) -> image::RgbaImage {
        pipeline.configure(10, false, LayerColors::default()).unwrap();
        // four black pixels and two red ones: red bin 0 = 4, red bin 9 = 2
        let mut data = [0u8, 0, 0, 255].repeat(4);
        data.extend([255u8, 0, 0, 255].repeat(2));
        let texture = HistogramTexture::from_rgba8(6, 1, data).unwrap();

        let red = EnabledLayers::only(HistogramLayer::Red);
        pipeline.process(&texture, red).unwrap();
        pipeline.render(red, 10, 4, RgbaColor::BLACK).unwrap()
    }

    fn assert_staircase(image: &image::RgbaImage, tolerance: u8) {
        let close = |a: [u8; 4], b: [u8; 4]| a.iter().zip(b).all(|(x, y)| x.abs_diff(y) <= tolerance);
        let red = [255, 0, 0, 255];
        let black = [0, 0, 0, 255];

        for y in 0..4 {
            assert!(close(image.get_pixel(0, y).0, red), "column 0 row {}", y);
            for x in 1..9 {
                assert!(close(image.get_pixel(x, y).0, black), "column {} row {}", x, y);
            }
            let expected = if y >= 2 { red } else { black };
            assert!(close(image.get_pixel(9, y).0, expected), "column 9 row {}", y);
        }
    }

    #[test]
    fn test_render_cpu() {
        let mut pipeline = HistogramPipeline::new(CpuBackend::new());
        let image = render_staircase(&mut pipeline);
        assert_eq!(image.dimensions(), (10, 4));
        assert_staircase(&image, 0);
    }

    #[test]
    fn test_render_blends_translucent_layers() {
        let mut pipeline = HistogramPipeline::new(CpuBackend::new());
        let colors = LayerColors::default().with_opacity(0.5);
        pipeline.configure(1, false, colors).unwrap();
        pipeline
            .process(&solid_bgra(1, 1, [255, 255, 255, 255]), EnabledLayers::ALL)
            .unwrap();

        let luminance = EnabledLayers::only(HistogramLayer::Luminance);
        let image = pipeline.render(luminance, 1, 1, RgbaColor::BLACK).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [128, 128, 128, 191]);
    }

    #[test]
    fn test_gpu_matches_cpu_reference() {
        let Some(backend) = gpu_backend() else {
            return;
        };
        let mut gpu = HistogramPipeline::new(backend);
        let texture = random_texture(97, 61, 42);

        for (bins, is_linear) in [(256, false), (64, true), (7, false)] {
            let mut cpu = cpu_pipeline(bins, is_linear);
            gpu.configure(bins, is_linear, LayerColors::default()).unwrap();
            cpu.process(&texture, EnabledLayers::ALL).unwrap();
            gpu.process(&texture, EnabledLayers::ALL).unwrap();

            for layer in HistogramLayer::ALL {
                let expected: Vec<u32> = cpu.histogram().layer(layer).collect();
                let actual: Vec<u32> = gpu.histogram().layer(layer).collect();
                assert_eq!(gpu.histogram().total(layer), texture.pixel_count() as u64);

                // decode and luminance may round differently on a bin edge
                let difference: u32 = expected.iter().zip(&actual).map(|(a, b)| a.abs_diff(*b)).sum();
                if layer == HistogramLayer::Luminance || is_linear {
                    assert!(difference <= 4, "{} bins, {}: {}", bins, layer, difference);
                } else {
                    assert_eq!(difference, 0, "{} bins, {}", bins, layer);
                }
            }

            let maxima = gpu.max_bin_values();
            for layer in HistogramLayer::ALL {
                assert_eq!(Some(maxima.get(layer)), gpu.histogram().layer(layer).max());
            }
        }
    }

    #[test]
    fn test_gpu_hundred_red_pixels() {
        let Some(backend) = gpu_backend() else {
            return;
        };
        let mut pipeline = HistogramPipeline::new(backend);
        pipeline.configure(4, true, LayerColors::default()).unwrap();
        pipeline
            .process(&solid_bgra(10, 10, [0, 0, 255, 255]), EnabledLayers::ALL)
            .unwrap();

        let red: Vec<u32> = pipeline.histogram().layer(HistogramLayer::Red).collect();
        assert_eq!(red, vec![0, 0, 0, 100]);
        assert_eq!(pipeline.max_bin_values().0, [100, 100, 100, 100]);

        // blank frame afterwards: the device buffers are cleared
        pipeline
            .process(&HistogramTexture::new(8, 8), EnabledLayers::ALL)
            .unwrap();
        assert!(pipeline.histogram().is_zero());
        assert_eq!(pipeline.max_bin_values().overall(), 0);
    }

    #[test]
    fn test_render_gpu() {
        let Some(backend) = gpu_backend() else {
            return;
        };
        let mut pipeline = HistogramPipeline::new(backend);
        let image = render_staircase(&mut pipeline);
        assert_eq!(image.dimensions(), (10, 4));
        assert_staircase(&image, 1);
    }
}

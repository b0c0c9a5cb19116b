use effort_render::color::hue_of;
use effort_render::{
    bench, interval_session, largest_triangle_three_buckets, run_benchmark, write_composite,
    BenchConfig, LatencyBudgets, RenderConfig, RenderSession, SegmentKind,
};

fn unlimited() -> LatencyBudgets {
    LatencyBudgets {
        initial_render_ms: f64::MAX,
        interaction_ms: f64::MAX,
        resize_ms: f64::MAX,
    }
}

#[test]
fn downsampling_keeps_every_work_peak() {
    let session = interval_session();
    let reduced = largest_triangle_three_buckets(&session.points, 500);
    assert_eq!(reduced.len(), 500);

    let works: Vec<_> = session.segments_of(SegmentKind::Work).collect();
    assert_eq!(works.len(), 6);
    for seg in works {
        assert!(seg.max_effort > 0.9);
        let best = reduced
            .iter()
            .filter(|p| seg.contains(p.time))
            .map(|p| p.effort)
            .fold(0.0_f64, f64::max);
        assert!(
            best >= seg.max_effort * 0.98,
            "rep {:?}: kept {best:.3}, max {:.3}",
            seg.rep,
            seg.max_effort
        );
    }
}

#[test]
fn bands_are_ordered_warmup_recovery_work_by_hue() {
    let synthetic = interval_session();
    let config = RenderConfig::default();
    let m = config.margins;
    // Container sized for a 1200 px chart.
    let width = (1200 + m.left + m.right) as f64;
    let session = RenderSession::new(synthetic.points.clone(), config, width, 240.0, Some(1.0)).unwrap();
    assert_eq!(session.geometry().chart_width(), 1200);

    let raster = session.raster();
    let region = raster.chart_region();
    let mid_y = region.top as f64 + region.height() as f64 / 2.0;
    let hue_at = |t: u32| {
        let col = (t as f64 / 3600.0 * 1200.0).floor();
        let rgb = raster
            .pixel_at_logical(region.left as f64 + col + 0.5, mid_y)
            .unwrap();
        let hue = hue_of(rgb).unwrap();
        if hue > 300.0 {
            hue - 360.0
        } else {
            hue
        }
    };

    let warmup = synthetic.segments_of(SegmentKind::Warmup).next().unwrap();
    let work = synthetic.segments_of(SegmentKind::Work).nth(2).unwrap();
    let recovery = synthetic.segments_of(SegmentKind::Recovery).nth(2).unwrap();

    let warm_hue = hue_at(warmup.start + 600);
    let work_hue = hue_at(work.end - 30);
    let recovery_hue = hue_at(recovery.midpoint() + 20);
    assert!(warm_hue > recovery_hue, "{warm_hue} vs {recovery_hue}");
    assert!(recovery_hue > work_hue, "{recovery_hue} vs {work_hue}");
}

#[test]
fn layers_stay_aligned_across_widths_and_ratios() {
    let synthetic = interval_session();
    let config = BenchConfig {
        container_height: 120.0,
        pointer_samples: 8,
        resize_samples: 2,
        budgets: unlimited(),
        ..BenchConfig::default()
    };
    let report = run_benchmark(&synthetic.points, &RenderConfig::default(), &config).unwrap();
    assert_eq!(report.scenarios.len(), 25);
    for scenario in &report.scenarios {
        let sync = &scenario.initial_sync;
        assert!(sync.logical_width_match, "{}", scenario.scenario);
        assert_eq!(sync.raster_logical.0, scenario.container_width);
        assert_eq!(
            sync.raster_physical.0,
            (scenario.container_width as f64 * scenario.device_pixel_ratio).round() as u32
        );
        assert_eq!(sync.region_delta, 0);
        assert!(scenario.swatch_matches_raster);
    }
    assert!(report.passed, "{:?}", report.failures().collect::<Vec<_>>());
}

#[test]
fn interaction_and_resize_fit_their_budgets() {
    let synthetic = interval_session();
    let config = BenchConfig {
        widths: vec![1200],
        device_pixel_ratios: vec![1.0],
        container_height: 300.0,
        pointer_samples: 200,
        resize_samples: 20,
        budgets: LatencyBudgets {
            initial_render_ms: f64::MAX,
            ..LatencyBudgets::default()
        },
    };
    let report = run_benchmark(&synthetic.points, &RenderConfig::default(), &config).unwrap();
    let scenario = &report.scenarios[0];
    assert_eq!(report.series_len, 3601);
    assert!(scenario.pointer.p95_ms < 33.0, "{:?}", scenario.pointer);
    assert!(scenario.resize.p95_ms < 100.0, "{:?}", scenario.resize);
}

#[test]
fn report_and_composite_land_on_disk() {
    let synthetic = interval_session();
    let dir = tempfile::tempdir().unwrap();

    let config = BenchConfig {
        widths: vec![375],
        device_pixel_ratios: vec![2.0],
        container_height: 160.0,
        pointer_samples: 10,
        resize_samples: 2,
        budgets: unlimited(),
    };
    let report = run_benchmark(&synthetic.points, &RenderConfig::default(), &config).unwrap();
    let path = dir.path().join("reports").join("bench.json");
    bench::write_report(&report, &path).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(json["passed"], serde_json::Value::Bool(true));
    assert_eq!(json["scenarios"][0]["initial_sync"]["logical_width_match"], true);

    let mut session =
        RenderSession::new(synthetic.points, RenderConfig::default(), 375.0, 160.0, Some(2.0)).unwrap();
    session.pointer_move(200.0).unwrap();
    let files = write_composite(&session, dir.path(), "interval").unwrap();
    assert!(files.png.exists() && files.svg.exists() && files.html.exists());
}

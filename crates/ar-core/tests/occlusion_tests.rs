// Host-side tests for depth decoding, strategy selection and light estimation.

use ar_core::depth::{default_occlusion_alpha, occlusion_alpha, DepthEncoding, DepthFrame};
use ar_core::lighting::LightEstimator;
use ar_core::*;
use instant::Instant;

fn settings(mode: OcclusionMode) -> SegmentationSettings {
    SegmentationSettings::new(mode, &PerformanceMode::Balanced.profile(), &["person".to_string()])
}

#[test]
fn depth_formats_are_negotiated() {
    assert_eq!(DepthEncoding::from_format("luminance-alpha"), Some(DepthEncoding::LuminanceAlpha));
    assert_eq!(DepthEncoding::from_format("float32"), Some(DepthEncoding::Float32));
    assert_eq!(DepthEncoding::from_format("unsigned-short"), Some(DepthEncoding::Uint16));
    assert_eq!(DepthEncoding::from_format("rgba8"), None);
}

#[test]
fn uint16_depth_uses_reported_scale() {
    // 2000 raw units at 0.5 mm per unit
    let raw = 2000u16.to_le_bytes();
    let data = [raw, raw, [0, 0], raw].concat();
    let frame = DepthFrame::new(2, 2, DepthEncoding::Uint16, Some(0.0005), data).unwrap();
    assert!((frame.sample_meters(0.1, 0.1).unwrap() - 1.0).abs() < 1e-6);
    assert_eq!(frame.sample_meters(0.1, 0.9), None, "zero is no reading");
    assert_eq!(frame.sample_meters(1.5, 0.0), None);
    let meters = frame.to_meters();
    assert!(meters[2].is_infinite());
}

#[test]
fn invalid_scale_falls_back_to_millimeters() {
    let data = 1500u16.to_le_bytes().to_vec();
    let frame = DepthFrame::new(1, 1, DepthEncoding::Uint16, Some(f32::NAN), data).unwrap();
    assert!((frame.raw_to_meters - 0.001).abs() < 1e-9);
    assert!((frame.sample_meters(0.5, 0.5).unwrap() - 1.5).abs() < 1e-6);
}

#[test]
fn short_depth_buffers_are_rejected() {
    let err = DepthFrame::new(4, 4, DepthEncoding::Float32, None, vec![0; 10]).unwrap_err();
    assert!(err.is_retryable());
}

#[test]
fn occlusion_needs_real_world_clearly_closer() {
    // no reading: always drawn
    assert_eq!(default_occlusion_alpha(2.0, None), 1.0);
    // real surface behind the wallpaper
    assert_eq!(default_occlusion_alpha(2.0, Some(2.5)), 1.0);
    // within the bias: still drawn
    assert_eq!(default_occlusion_alpha(2.0, Some(1.98)), 1.0);
    // well in front: hidden
    assert_eq!(default_occlusion_alpha(2.0, Some(1.0)), 0.0);
    // inside the soft band: partial
    let a = default_occlusion_alpha(2.0, Some(2.0 - 0.05));
    assert!(a > 0.0 && a < 1.0);
}

#[test]
fn occlusion_alpha_is_monotonic_in_depth_gap() {
    let mut last = 1.0;
    for i in 0..100 {
        let real = 2.0 - i as f32 * 0.002;
        let a = occlusion_alpha(2.0, Some(real), 0.03, 0.04);
        assert!(a <= last + 1e-6);
        last = a;
    }
    assert_eq!(occlusion_alpha(2.0, Some(1.9), 0.03, 0.0), 0.0);
    assert_eq!(occlusion_alpha(2.0, Some(1.99), 0.03, 0.0), 1.0);
}

#[test]
fn depth_wins_when_available() {
    let p = OcclusionPipeline::new(
        OcclusionMode::DepthThenSegmentation,
        true,
        settings(OcclusionMode::DepthThenSegmentation),
        720,
    );
    assert_eq!(p.kind(), OcclusionKind::Depth);
    assert!(!p.needs_models());
    let labels = StatusLabels::default();
    assert_eq!(p.status(&labels).state, StatusState::Success);
    assert_eq!(p.status(&labels).label, "Depth sensing");
}

#[test]
fn depth_passes_frames_through_raw() {
    let mut p = OcclusionPipeline::new(
        OcclusionMode::DepthThenSegmentation,
        true,
        settings(OcclusionMode::DepthThenSegmentation),
        720,
    );
    let frame = DepthFrame::new(1, 1, DepthEncoding::LuminanceAlpha, None, vec![0xE8, 0x03]).unwrap();
    let source = SourceFrame {
        depth: Some(&frame),
        ..SourceFrame::default()
    };
    let out = p.estimate(source, 64, 64, Instant::now());
    assert_eq!(out.kind, OcclusionKind::Depth);
    assert_eq!(out.depth(), Some(&frame));
    assert_eq!(out.scale_to_meters, Some(0.001));

    let missing = p.estimate(SourceFrame::default(), 64, 64, Instant::now());
    assert_eq!(missing.kind, OcclusionKind::None);
}

#[test]
fn segmentation_is_used_without_depth() {
    let p = OcclusionPipeline::new(
        OcclusionMode::DepthThenSegmentation,
        false,
        settings(OcclusionMode::DepthThenSegmentation),
        720,
    );
    assert_eq!(p.kind(), OcclusionKind::Segmentation);
    assert!(p.needs_models());
    assert_eq!(p.status(&StatusLabels::default()).state, StatusState::Pending);
}

#[test]
fn segmentation_modes_skip_depth() {
    let mut p = OcclusionPipeline::new(
        OcclusionMode::SegmentationPlusObjects,
        true,
        settings(OcclusionMode::SegmentationPlusObjects),
        720,
    );
    assert_eq!(p.kind(), OcclusionKind::Segmentation);
    assert!(p.segmentation().unwrap().wants_detector());
}

#[test]
fn ungranted_depth_starts_on_segmentation_without_detector() {
    // depth-sensing requested but not negotiated by the session
    let mut p = OcclusionPipeline::new(
        OcclusionMode::DepthThenSegmentation,
        false,
        settings(OcclusionMode::DepthThenSegmentation),
        720,
    );
    assert_eq!(p.kind(), OcclusionKind::Segmentation);
    assert!(p.needs_models());
    assert!(!p.segmentation().unwrap().wants_detector());
}

#[test]
fn model_failure_disables_occlusion_with_warning() {
    let mut p = OcclusionPipeline::new(
        OcclusionMode::SegmentationOnly,
        false,
        settings(OcclusionMode::SegmentationOnly),
        720,
    );
    p.models_failed(&ArError::ModelLoad("all sources failed".into()));
    assert!(!p.needs_models());
    let event = p.status(&StatusLabels::default());
    assert_eq!(event.id, Subsystem::Occlusion);
    assert_eq!(event.state, StatusState::Warning);
    let frame = RgbaImage::new(32, 32);
    let source = SourceFrame {
        camera: Some(&frame),
        ..SourceFrame::default()
    };
    assert_eq!(p.estimate(source, 32, 32, Instant::now()).kind, OcclusionKind::None);
}

#[test]
fn off_mode_never_estimates() {
    let mut p = OcclusionPipeline::new(OcclusionMode::Off, true, settings(OcclusionMode::Off), 720);
    assert_eq!(p.kind(), OcclusionKind::None);
    assert!(p.segmentation().is_none());
    assert_eq!(p.status(&StatusLabels::default()).state, StatusState::Neutral);
}

#[test]
fn pipeline_output_respects_budget() {
    let mut p = OcclusionPipeline::new(OcclusionMode::Off, false, settings(OcclusionMode::Off), 480);
    let out = p.estimate(SourceFrame::default(), 1920, 1080, Instant::now());
    assert_eq!(out.resolution, (480, 270));
}

#[test]
fn light_estimate_is_smoothed_and_clamped() {
    let mut light = LightEstimator::default();
    assert_eq!(light.factor(), 1.0);
    assert!(!light.has_estimate());
    assert_eq!(light.update([0.5, 0.5, 0.5]), 0.5);
    let next = light.update([1.5, 1.5, 1.5]);
    assert!((next - 0.6).abs() < 1e-6);
    light.update([f32::NAN, 0.0, 0.0]);
    assert!((light.factor() - 0.6).abs() < 1e-6);
    assert!((light.apply(10.0) - 2.0).abs() < 1e-6);

    let mut dark = LightEstimator::default();
    assert!((dark.update([0.0, 0.0, 0.0]) - 0.2).abs() < 1e-6);
    dark.reset();
    assert_eq!(dark.factor(), 1.0);
}

#[test]
fn light_status_reports_availability() {
    let labels = StatusLabels::default();
    let mut light = LightEstimator::default();
    assert_eq!(light.status(&labels).state, StatusState::Neutral);
    light.update([1.0, 1.0, 1.0]);
    assert_eq!(light.status(&labels).state, StatusState::Success);
}

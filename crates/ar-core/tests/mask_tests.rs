// Host-side tests for mask post-processing and the segmentation strategy.

use ar_core::mask::{same_label, TemporalSmoother};
use ar_core::*;
use instant::Instant;
use std::time::Duration;
use std::result::Result;

struct Lcg(u64);

impl Lcg {
    fn next_u8(&mut self) -> u8 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 56) as u8
    }
}

fn random_mask(rng: &mut Lcg, w: u32, h: u32) -> Mask {
    let alpha = (0..w * h).map(|_| rng.next_u8()).collect();
    Mask::from_alpha(w, h, alpha).unwrap()
}

#[test]
fn temporal_smoothing_fixed_point() {
    let mut rng = Lcg(11);
    let mask = random_mask(&mut rng, 17, 9);
    let mut smoother = TemporalSmoother::default();
    for _ in 0..20 {
        assert_eq!(smoother.apply(&mask), mask);
    }
}

#[test]
fn temporal_smoothing_blends_toward_new_input() {
    let mut smoother = TemporalSmoother::new(0.6);
    let off = Mask::from_alpha(2, 1, vec![0, 0]).unwrap();
    let on = Mask::from_alpha(2, 1, vec![255, 255]).unwrap();
    smoother.apply(&off);
    let once = smoother.apply(&on);
    assert_eq!(once.alpha(), &[102, 102]);
    let twice = smoother.apply(&on);
    assert!(twice.alpha()[0] > 102);
}

#[test]
fn temporal_smoothing_restarts_on_size_change() {
    let mut smoother = TemporalSmoother::default();
    smoother.apply(&Mask::new(4, 4));
    let bigger = Mask::from_alpha(2, 1, vec![255, 10]).unwrap();
    assert_eq!(smoother.apply(&bigger), bigger);
}

#[test]
fn confidence_threshold_is_inclusive() {
    let m = Mask::from_confidence(4, 1, &[0.2, 0.5, 0.6, 0.99], 0.5).unwrap();
    assert_eq!(m.alpha(), &[0, 255, 255, 255]);
    assert!(Mask::from_confidence(2, 2, &[0.0; 3], 0.5).is_none());
}

#[test]
fn categories_keep_only_allowed_labels() {
    let labels = vec!["background".to_string(), "Person".to_string(), "cat".to_string()];
    let allow = vec!["person".to_string()];
    let m = Mask::from_categories(4, 1, &[0, 1, 2, 7], &labels, &allow).unwrap();
    assert_eq!(m.alpha(), &[0, 255, 0, 0]);
}

#[test]
fn labels_match_across_spacing_and_case() {
    assert!(same_label("dining table", "diningtable"));
    assert!(same_label("potted plant", "Potted_Plant"));
    assert!(same_label(" person ", "Person"));
    assert!(!same_label("potted plant", "plant"));

    let labels = vec!["background".to_string(), "pottedplant".to_string(), "diningtable".to_string()];
    let allow = vec!["potted plant".to_string(), "dining table".to_string()];
    let m = Mask::from_categories(3, 1, &[0, 1, 2], &labels, &allow).unwrap();
    assert_eq!(m.alpha(), &[0, 255, 255]);
}

#[test]
fn dilation_grows_by_radius() {
    let mut alpha = vec![0u8; 9 * 9];
    alpha[4 * 9 + 4] = 255;
    let mut m = Mask::from_alpha(9, 9, alpha).unwrap();
    m.dilate(2);
    for y in 0..9 {
        for x in 0..9 {
            let inside = (2..=6).contains(&x) && (2..=6).contains(&y);
            assert_eq!(m.get(x, y) == 255, inside, "({x}, {y})");
        }
    }
}

#[test]
fn feathering_softens_edges_only() {
    let alpha = (0..20).map(|i| if i < 10 { 255 } else { 0 }).collect();
    let m = Mask::from_alpha(20, 1, alpha).unwrap();
    let soft = m.feathered(2);
    assert_eq!(soft.get(0, 0), 255);
    assert_eq!(soft.get(19, 0), 0);
    let edge = soft.get(9, 0);
    assert!(edge > 0 && edge < 255);
    let alpha = soft.alpha();
    assert!(alpha.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn detection_boxes_are_ored_in_with_margin() {
    let mut m = Mask::new(10, 10);
    let person = DetectionBox::from_pixels("person", [20.0, 20.0, 20.0, 20.0], (100, 100), 0.9);
    assert!((person.rect.x1 - 0.4).abs() < 1e-6);
    m.merge_boxes(&[person], 0.05);
    assert_eq!(m.get(1, 1), 255);
    assert_eq!(m.get(4, 4), 255);
    assert_eq!(m.get(5, 5), 0);
    assert_eq!(m.get(0, 0), 0);

    let outside = DetectionBox::from_pixels("chair", [150.0, 150.0, 30.0, 30.0], (100, 100), 0.9);
    let before = m.clone();
    m.merge_boxes(&[outside], 0.0);
    assert_eq!(m, before);
}

#[test]
fn resampling_preserves_solid_regions() {
    let alpha = (0..16).map(|i| if i % 4 < 2 { 255 } else { 0 }).collect();
    let m = Mask::from_alpha(4, 4, alpha).unwrap();
    let up = m.resampled(16, 16);
    assert_eq!(up.get(0, 8), 255);
    assert_eq!(up.get(15, 8), 0);
    assert!((up.coverage() - 0.5).abs() < 0.2);
}

struct Scripted {
    calls: usize,
}

impl Segmenter for Scripted {
    fn segment(&mut self, frame: &RgbaImage, _ts: f64) -> Result<SegmentationOutput, ArError> {
        self.calls += 1;
        let (w, h) = (frame.width(), frame.height());
        Ok(SegmentationOutput::Confidence {
            width: w,
            height: h,
            values: vec![1.0; (w * h) as usize],
        })
    }
}

struct Boxes;

impl ObjectDetector for Boxes {
    fn detect(&mut self, frame: &RgbaImage, _ts: f64) -> Result<Vec<DetectionBox>, ArError> {
        let src = (frame.width(), frame.height());
        Ok(vec![
            DetectionBox::from_pixels("chair", [0.0, 0.0, 1.0, 1.0], src, 0.9),
            DetectionBox::from_pixels("window", [0.0, 0.0, 1.0, 1.0], src, 0.9),
        ])
    }
}

fn settings(interval_ms: u64) -> SegmentationSettings {
    let mut s = SegmentationSettings::new(
        OcclusionMode::SegmentationOnly,
        &PerformanceMode::Balanced.profile(),
        &["person".to_string(), "chair".to_string()],
    );
    s.interval = Duration::from_millis(interval_ms);
    s
}

#[test]
fn objects_mode_raises_the_threshold() {
    let profile = PerformanceMode::Quality.profile();
    let plain = SegmentationSettings::new(OcclusionMode::SegmentationOnly, &profile, &[]);
    let objects = SegmentationSettings::new(OcclusionMode::SegmentationPlusObjects, &profile, &[]);
    assert!((plain.threshold - 0.5).abs() < 1e-6);
    assert!((objects.threshold - 0.6).abs() < 1e-6);
}

#[test]
fn inference_gate_throttles_runs() {
    let mut gate = InferenceGate::new(Duration::from_millis(100));
    let t0 = Instant::now();
    assert!(gate.try_begin(t0));
    assert!(!gate.try_begin(t0 + Duration::from_millis(500)), "one in flight at most");
    gate.finish();
    assert!(!gate.try_begin(t0 + Duration::from_millis(50)));
    assert!(gate.try_begin(t0 + Duration::from_millis(100)));
}

#[test]
fn nothing_is_returned_before_models_load() {
    let mut seg = SegmentationOcclusion::new(settings(0), false);
    let frame = RgbaImage::new(8, 8);
    let out = seg.estimate(Some(&frame), 8, 8, Instant::now(), 0.0);
    assert_eq!(out.kind, OcclusionKind::None);
    assert_eq!(seg.state(), ModelState::Loading);
}

#[test]
fn cached_mask_is_reused_between_runs() {
    let mut seg = SegmentationOcclusion::new(settings(1000), false);
    seg.set_models(Box::new(Scripted { calls: 0 }), None);
    let frame = RgbaImage::new(8, 8);
    let t0 = Instant::now();

    let first = seg.estimate(Some(&frame), 8, 8, t0, 0.0);
    assert_eq!(first.kind, OcclusionKind::Segmentation);
    assert_eq!(seg.runs(), 1);

    let second = seg.estimate(Some(&frame), 8, 8, t0 + Duration::from_millis(16), 16.0);
    assert_eq!(seg.runs(), 1);
    assert_eq!(second.mask(), first.mask());

    seg.estimate(Some(&frame), 8, 8, t0 + Duration::from_millis(1000), 1000.0);
    assert_eq!(seg.runs(), 2);
}

#[test]
fn detector_boxes_need_an_allowed_label() {
    let mut seg = SegmentationOcclusion::new(settings(0), true);
    let empty = SegmentationOutput::Confidence {
        width: 10,
        height: 10,
        values: vec![0.0; 100],
    };
    let chair = DetectionBox::from_pixels("Chair", [0.0, 0.0, 2.0, 2.0], (10, 10), 0.9);
    let window = DetectionBox::from_pixels("window", [6.0, 6.0, 2.0, 2.0], (10, 10), 0.9);
    let weak = DetectionBox::from_pixels("person", [6.0, 0.0, 2.0, 2.0], (10, 10), 0.1);
    seg.ingest(empty, &[chair, window, weak]).unwrap();
    let mask = seg.latest().unwrap();
    assert_eq!(mask.get(0, 0), 255);
    assert_eq!(mask.get(9, 9), 0);
    assert_eq!(mask.get(9, 0), 0);
}

#[test]
fn detector_labels_match_configured_names_with_spaces() {
    let profile = PerformanceMode::Balanced.profile();
    let mut settings = SegmentationSettings::new(
        OcclusionMode::SegmentationPlusObjects,
        &profile,
        &["dining table".to_string()],
    );
    settings.interval = Duration::ZERO;
    let mut seg = SegmentationOcclusion::new(settings, true);
    let empty = SegmentationOutput::Confidence {
        width: 10,
        height: 10,
        values: vec![0.0; 100],
    };
    let table = DetectionBox::from_pixels("diningtable", [0.0, 0.0, 2.0, 2.0], (10, 10), 0.9);
    seg.ingest(empty, &[table]).unwrap();
    assert_eq!(seg.latest().unwrap().get(0, 0), 255);
}

#[test]
fn detector_is_dropped_when_not_wanted() {
    let mut seg = SegmentationOcclusion::new(settings(0), false);
    seg.set_models(Box::new(Scripted { calls: 0 }), Some(Box::new(Boxes)));
    assert_eq!(seg.state(), ModelState::Ready);
    assert!(!seg.wants_detector());
}

#[test]
fn mismatched_output_is_an_error() {
    let mut seg = SegmentationOcclusion::new(settings(0), false);
    let bad = SegmentationOutput::Confidence {
        width: 4,
        height: 4,
        values: vec![1.0; 3],
    };
    assert!(seg.ingest(bad, &[]).is_err());
    assert!(seg.latest().is_none());
}

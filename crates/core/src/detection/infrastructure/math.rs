//! Box geometry shared by the ONNX detection backend.

/// IoU between two bounding boxes represented as `[x1, y1, x2, y2]`.
pub fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

/// Greedy non-maximum suppression.
///
/// Returns indices into `boxes` of the kept detections, highest score first.
/// A box is suppressed when its IoU with an already-kept box exceeds
/// `iou_thresh`.
pub fn nms(boxes: &[[f64; 4]], scores: &[f64], iou_thresh: f64) -> Vec<usize> {
    debug_assert_eq!(boxes.len(), scores.len());
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    for idx in order {
        let overlaps = keep
            .iter()
            .any(|&k| bbox_iou(&boxes[k], &boxes[idx]) > iou_thresh);
        if !overlaps {
            keep.push(idx);
        }
    }
    keep
}

//! Face-region selection policy.
//!
//! Ranks detected faces by raw bounding-box area and keeps the largest ones;
//! the largest retained face becomes the photo's primary face.

use std::cmp::Ordering;

use crate::types::DetectedFace;

/// Retain the `n` largest faces by raw float area, largest first.
///
/// The sort is stable, so faces with exactly equal areas keep the detector's
/// output order and the first-seen face wins ties. Fewer than `n` inputs are
/// returned as-is; an empty input yields an empty output.
pub fn select_top_n(mut faces: Vec<DetectedFace>, n: usize) -> Vec<DetectedFace> {
    faces.sort_by(|a, b| {
        b.area()
            .partial_cmp(&a.area())
            .unwrap_or(Ordering::Equal)
    });
    faces.truncate(n);
    faces
}

/// The single largest face, used by the query path.
pub fn select_largest(faces: Vec<DetectedFace>) -> Option<DetectedFace> {
    select_top_n(faces, 1).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_with_area(area: f32, marker: f32) -> DetectedFace {
        // Unit-height box: width equals the requested area.
        DetectedFace {
            bbox: [0.0, 0.0, area, 1.0],
            embedding: vec![marker],
            confidence: 0.9,
        }
    }

    #[test]
    fn test_top_three_of_five() {
        let faces = [100.0, 50.0, 200.0, 10.0, 150.0]
            .iter()
            .map(|&a| face_with_area(a, a))
            .collect();

        let selected = select_top_n(faces, 3);
        let areas: Vec<f32> = selected.iter().map(|f| f.area()).collect();
        assert_eq!(areas, vec![200.0, 150.0, 100.0]);
    }

    #[test]
    fn test_fewer_candidates_than_n() {
        let faces = vec![face_with_area(10.0, 1.0), face_with_area(20.0, 2.0)];
        let selected = select_top_n(faces, 3);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].area(), 20.0);
        assert_eq!(selected[1].area(), 10.0);
    }

    #[test]
    fn test_empty_input_is_not_an_error() {
        assert!(select_top_n(vec![], 3).is_empty());
        assert!(select_largest(vec![]).is_none());
    }

    #[test]
    fn test_ties_keep_detector_order() {
        let faces = vec![
            face_with_area(50.0, 1.0),
            face_with_area(50.0, 2.0),
            face_with_area(50.0, 3.0),
        ];
        let selected = select_top_n(faces, 2);
        assert_eq!(selected[0].embedding, vec![1.0]);
        assert_eq!(selected[1].embedding, vec![2.0]);
    }

    #[test]
    fn test_ranking_uses_float_area() {
        // 10.4 x 10.4 = 108.16 beats 10 x 10 = 100 even though both truncate
        // to the same integer corners span.
        let small = DetectedFace {
            bbox: [0.0, 0.0, 10.0, 10.0],
            embedding: vec![1.0],
            confidence: 0.9,
        };
        let large = DetectedFace {
            bbox: [0.0, 0.0, 10.4, 10.4],
            embedding: vec![2.0],
            confidence: 0.9,
        };
        let selected = select_top_n(vec![small, large], 1);
        assert_eq!(selected[0].embedding, vec![2.0]);
    }

    #[test]
    fn test_select_largest_is_top_one() {
        let faces = vec![face_with_area(10.0, 1.0), face_with_area(30.0, 2.0)];
        let largest = select_largest(faces).unwrap();
        assert_eq!(largest.embedding, vec![2.0]);
    }
}

//! Score and best/worst ranking over a restored-face set.

use std::cmp::Ordering;

use crate::types::{FaceIndex, Metrics, RestoredFace};

/// Weight applied to SSIM and LPIPS so they are comparable to PSNR in dB.
const METRIC_WEIGHT: f64 = 100.0;

/// `psnr + 100*ssim - 100*lpips`, with every absent metric contributing 0.
pub fn score(metrics: Option<&Metrics>) -> f64 {
    let Some(m) = metrics else {
        return 0.0;
    };
    m.psnr.unwrap_or(0.0) + METRIC_WEIGHT * m.ssim.unwrap_or(0.0)
        - METRIC_WEIGHT * m.lpips.unwrap_or(0.0)
}

/// Fill in the derived score of every face.
pub fn with_scores(mut faces: Vec<RestoredFace>) -> Vec<RestoredFace> {
    for face in &mut faces {
        face.score = score(face.metrics.as_ref());
    }
    faces
}

/// Best and worst restored face indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ranking {
    pub best: FaceIndex,
    pub worst: FaceIndex,
}

/// Rank by score, highest first.
///
/// A copy is stable-sorted descending, so equal scores keep their input order:
/// best is the first element of the sorted copy, worst the last. Returns `None`
/// for fewer than two faces, where the markers carry no meaning.
pub fn rank(faces: &[RestoredFace]) -> Option<Ranking> {
    if faces.len() < 2 {
        return None;
    }
    let mut sorted: Vec<&RestoredFace> = faces.iter().collect();
    // Numeric comparison: -0.0 and 0.0 tie.
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    Some(Ranking {
        best: sorted.first()?.index,
        worst: sorted.last()?.index,
    })
}

/// Display tag for one restored face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceTag {
    Best,
    Worst,
    /// Exactly one face was restored, so nothing is ranked.
    OnlyOne,
}

/// Tag for `index` within a restored set of `count` faces.
pub fn tag_for(index: FaceIndex, count: usize, ranking: Option<Ranking>) -> Option<FaceTag> {
    if count == 1 {
        return Some(FaceTag::OnlyOne);
    }
    let ranking = ranking?;
    if index == ranking.best {
        Some(FaceTag::Best)
    } else if index == ranking.worst {
        Some(FaceTag::Worst)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(index: FaceIndex, psnr: f64, ssim: f64, lpips: f64) -> RestoredFace {
        RestoredFace {
            index,
            url: format!("/r{index}"),
            metrics: Some(Metrics {
                psnr: Some(psnr),
                ssim: Some(ssim),
                lpips: Some(lpips),
            }),
            score: 0.0,
        }
    }

    fn bare(index: FaceIndex) -> RestoredFace {
        RestoredFace { index, url: format!("/r{index}"), metrics: None, score: 0.0 }
    }

    #[test]
    fn test_score_formula() {
        let m = Metrics { psnr: Some(32.0), ssim: Some(0.9), lpips: Some(0.1) };
        assert!((score(Some(&m)) - 112.0).abs() < 1e-9);
        let m = Metrics { psnr: Some(28.0), ssim: Some(0.8), lpips: Some(0.4) };
        assert!((score(Some(&m)) - 68.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_missing_metrics_are_zero() {
        assert_eq!(score(None), 0.0);
        assert_eq!(score(Some(&Metrics::default())), 0.0);
        let m = Metrics { psnr: Some(30.0), ssim: None, lpips: None };
        assert_eq!(score(Some(&m)), 30.0);
        let m = Metrics { psnr: None, ssim: None, lpips: Some(0.25) };
        assert_eq!(score(Some(&m)), -25.0);
    }

    #[test]
    fn test_score_monotonic() {
        let base = Metrics { psnr: Some(30.0), ssim: Some(0.8), lpips: Some(0.2) };
        let s = score(Some(&base));
        assert!(score(Some(&Metrics { psnr: Some(31.0), ..base })) > s);
        assert!(score(Some(&Metrics { ssim: Some(0.85), ..base })) > s);
        assert!(score(Some(&Metrics { lpips: Some(0.3), ..base })) < s);
    }

    #[test]
    fn test_rank_two_faces() {
        let faces = with_scores(vec![face(3, 32.0, 0.9, 0.1), face(7, 28.0, 0.8, 0.4)]);
        let ranking = rank(&faces).unwrap();
        assert_eq!(ranking, Ranking { best: 3, worst: 7 });
    }

    #[test]
    fn test_rank_unsorted_input() {
        let faces = with_scores(vec![
            face(0, 25.0, 0.7, 0.3),
            face(1, 35.0, 0.95, 0.05),
            face(2, 20.0, 0.5, 0.6),
            face(4, 30.0, 0.8, 0.2),
        ]);
        let ranking = rank(&faces).unwrap();
        assert_eq!(ranking.best, 1);
        assert_eq!(ranking.worst, 2);
        assert_ne!(ranking.best, ranking.worst);
    }

    #[test]
    fn test_rank_single_face_is_none() {
        let faces = with_scores(vec![face(5, 40.0, 1.0, 0.0)]);
        assert!(rank(&faces).is_none());
        assert!(rank(&[]).is_none());
    }

    #[test]
    fn test_rank_ties_follow_stable_order() {
        // All scores equal: stable sort keeps input order.
        let faces = with_scores(vec![bare(9), bare(2), bare(5)]);
        let ranking = rank(&faces).unwrap();
        assert_eq!(ranking.best, 9);
        assert_eq!(ranking.worst, 5);

        // Tie at the top, distinct bottom.
        let faces = with_scores(vec![
            face(1, 10.0, 0.0, 0.0),
            face(2, 30.0, 0.0, 0.0),
            face(3, 30.0, 0.0, 0.0),
        ]);
        assert_eq!(rank(&faces).unwrap(), Ranking { best: 2, worst: 1 });

        // Negative zero ties with zero.
        let faces = with_scores(vec![
            face(4, -0.0, -0.0, 0.0),
            face(5, 0.0, 0.0, 0.0),
            face(6, 0.0, 0.0, 0.0),
        ]);
        assert_eq!(rank(&faces).unwrap(), Ranking { best: 4, worst: 6 });
    }

    #[test]
    fn test_tag_for() {
        let ranking = Some(Ranking { best: 1, worst: 2 });
        assert_eq!(tag_for(1, 3, ranking), Some(FaceTag::Best));
        assert_eq!(tag_for(2, 3, ranking), Some(FaceTag::Worst));
        assert_eq!(tag_for(0, 3, ranking), None);
        assert_eq!(tag_for(4, 1, None), Some(FaceTag::OnlyOne));
    }
}

//! Workflow record and its transitions.
//!
//! Each network-bound operation is split in two: `begin_*` validates the
//! request, marks it pending and hands back a [`Ticket`] with the payload to
//! send; `finish_*` consumes the ticket together with the service response.
//! Upstream changes cascade-clear everything derived from them, and a response
//! whose upstream changed while it was in flight is discarded.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::ranking::{self, FaceTag, Ranking};
use crate::service::{Artifact, Detection, ServiceError};
use crate::types::{DetectedFace, FaceIndex, MergedResult, Mode, OpKind, RestoredFace, SourceImage};

/// Invalidation levels. Invalidating a stage also invalidates every later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Image = 0,
    Detection = 1,
    Restoration = 2,
}

/// An in-flight request: the operation, its payload, and the generation of
/// the upstream stage it was issued against.
#[derive(Debug)]
pub struct Ticket<T> {
    op: OpKind,
    guard: Option<(Stage, u64)>,
    payload: T,
}

impl<T> Ticket<T> {
    pub fn op(&self) -> OpKind {
        self.op
    }

    /// Data to send to the face service.
    pub fn payload(&self) -> &T {
        &self.payload
    }
}

/// One before/after row of the restored set.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison<'a> {
    /// Position in the restored sequence (the download flag slot).
    pub position: usize,
    pub before: &'a DetectedFace,
    pub after: &'a RestoredFace,
    pub tag: Option<FaceTag>,
    /// Whether this face is flagged for "download selected".
    pub keep: bool,
}

/// The single workflow record.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    run_id: Option<Uuid>,
    source: Option<Arc<SourceImage>>,
    source_path: Option<String>,
    detected: Vec<DetectedFace>,
    selection: BTreeSet<FaceIndex>,
    restored: Vec<RestoredFace>,
    /// Parallel to `restored`; resized and reset whenever `restored` is replaced.
    download_flags: Vec<bool>,
    ranking: Option<Ranking>,
    merged: Option<MergedResult>,
    pending: BTreeSet<OpKind>,
    generations: [u64; 3],
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Transitions ---

    /// Replace the source image and reset everything downstream.
    ///
    /// Choosing the same bytes again is a full reset, not a no-op. Requests
    /// already in flight keep their pending flag until they resolve, but
    /// their responses are discarded.
    pub fn choose_image(
        &mut self,
        bytes: Vec<u8>,
        file_name: Option<String>,
    ) -> Result<Uuid, WorkflowError> {
        let image = SourceImage::new(bytes, file_name)?;
        let run_id = Uuid::new_v4();
        tracing::info!(
            %run_id,
            format = ?image.format,
            bytes = image.bytes.len(),
            "image chosen"
        );

        self.run_id = Some(run_id);
        self.source = Some(Arc::new(image));
        self.source_path = None;
        self.detected.clear();
        self.clear_selection_and_results();
        self.invalidate(Stage::Image);
        Ok(run_id)
    }

    pub fn begin_detect(&mut self) -> Result<Ticket<Arc<SourceImage>>, WorkflowError> {
        self.ensure_idle(&[OpKind::Detect])?;
        let image = self.source.clone().ok_or(WorkflowError::NoImageChosen)?;
        Ok(self.issue(OpKind::Detect, Some(Stage::Image), image))
    }

    pub fn finish_detect(
        &mut self,
        ticket: Ticket<Arc<SourceImage>>,
        result: Result<Detection, ServiceError>,
    ) -> Result<&[DetectedFace], WorkflowError> {
        self.settle(&ticket)?;
        let detection = result.map_err(|e| WorkflowError::DetectionFailed(e.to_string()))?;
        if let Some(dup) = first_duplicate(detection.faces.iter().map(|f| f.index)) {
            return Err(WorkflowError::DetectionFailed(format!(
                "duplicate face index {dup}"
            )));
        }

        self.detected = detection.faces;
        self.source_path = Some(detection.source_path).filter(|p| !p.is_empty());
        self.clear_selection_and_results();
        self.invalidate(Stage::Detection);
        tracing::info!(
            run_id = ?self.run_id,
            faces = self.detected.len(),
            "faces detected"
        );
        Ok(&self.detected)
    }

    /// Flip membership of `index` in the restoration selection.
    ///
    /// Returns whether the face is now selected. Unknown indices are rejected
    /// and leave the selection untouched.
    pub fn toggle_face(&mut self, index: FaceIndex) -> Result<bool, WorkflowError> {
        if !self.detected.iter().any(|f| f.index == index) {
            return Err(WorkflowError::UnknownFace(index));
        }
        if self.selection.remove(&index) {
            Ok(false)
        } else {
            self.selection.insert(index);
            Ok(true)
        }
    }

    /// Resolve the faces to restore. Either restore mode in flight blocks both.
    pub fn begin_restore(
        &mut self,
        mode: Mode,
    ) -> Result<Ticket<Vec<DetectedFace>>, WorkflowError> {
        self.ensure_idle(&[OpKind::RestoreSelected, OpKind::RestoreAll])?;
        let faces: Vec<DetectedFace> = match mode {
            Mode::All => self.detected.clone(),
            Mode::Selected => self
                .detected
                .iter()
                .filter(|f| self.selection.contains(&f.index))
                .cloned()
                .collect(),
        };
        if faces.is_empty() {
            return Err(WorkflowError::NoFacesChosen);
        }
        Ok(self.issue(OpKind::restore(mode), Some(Stage::Detection), faces))
    }

    pub fn finish_restore(
        &mut self,
        ticket: Ticket<Vec<DetectedFace>>,
        result: Result<Vec<RestoredFace>, ServiceError>,
    ) -> Result<&[RestoredFace], WorkflowError> {
        self.settle(&ticket)?;
        let restored = result.map_err(|e| WorkflowError::RestorationFailed(e.to_string()))?;
        if let Some(dup) = first_duplicate(restored.iter().map(|f| f.index)) {
            return Err(WorkflowError::RestorationFailed(format!(
                "duplicate restored face {dup}"
            )));
        }
        // Every restored face needs its "before" crop.
        if let Some(stray) = restored
            .iter()
            .find(|r| !self.detected.iter().any(|d| d.index == r.index))
        {
            return Err(WorkflowError::RestorationFailed(format!(
                "restored face {} was never detected",
                stray.index
            )));
        }

        let restored = ranking::with_scores(restored);
        self.ranking = ranking::rank(&restored);
        self.download_flags = vec![false; restored.len()];
        self.restored = restored;
        self.merged = None;
        self.invalidate(Stage::Restoration);
        tracing::info!(
            run_id = ?self.run_id,
            restored = self.restored.len(),
            best = ?self.ranking.map(|r| r.best),
            worst = ?self.ranking.map(|r| r.worst),
            "faces restored"
        );
        Ok(&self.restored)
    }

    /// Flip the download flag at `position`; returns the new flag value.
    pub fn toggle_download(&mut self, position: usize) -> Result<bool, WorkflowError> {
        let len = self.download_flags.len();
        let flag = self
            .download_flags
            .get_mut(position)
            .ok_or(WorkflowError::PositionOutOfRange { position, len })?;
        *flag = !*flag;
        Ok(*flag)
    }

    /// Resolve the restored faces to package. Each download mode only
    /// excludes itself.
    pub fn begin_download(
        &mut self,
        mode: Mode,
    ) -> Result<Ticket<Vec<RestoredFace>>, WorkflowError> {
        let op = OpKind::download(mode);
        self.ensure_idle(&[op])?;
        let faces: Vec<RestoredFace> = match mode {
            Mode::All => self.restored.clone(),
            Mode::Selected => self
                .restored
                .iter()
                .zip(&self.download_flags)
                .filter(|(_, &keep)| keep)
                .map(|(f, _)| f.clone())
                .collect(),
        };
        if faces.is_empty() {
            return Err(WorkflowError::NoFacesChosen);
        }
        Ok(self.issue(op, None, faces))
    }

    /// Returns the artifact URL for the rendering surface to save.
    pub fn finish_download(
        &mut self,
        ticket: Ticket<Vec<RestoredFace>>,
        result: Result<Artifact, ServiceError>,
    ) -> Result<String, WorkflowError> {
        self.settle(&ticket)?;
        let artifact = result.map_err(|e| WorkflowError::DownloadFailed(e.to_string()))?;
        if artifact.url.is_empty() {
            return Err(WorkflowError::DownloadFailed("empty artifact url".into()));
        }
        tracing::info!(faces = ticket.payload.len(), url = %artifact.url, "download packaged");
        Ok(artifact.url)
    }

    pub fn begin_merge(&mut self) -> Result<Ticket<String>, WorkflowError> {
        self.ensure_idle(&[OpKind::Merge])?;
        let path = self
            .source_path
            .clone()
            .ok_or(WorkflowError::MissingSourcePath)?;
        if self.merged.is_some() {
            return Err(WorkflowError::AlreadyMerged);
        }
        Ok(self.issue(OpKind::Merge, Some(Stage::Restoration), path))
    }

    pub fn finish_merge(
        &mut self,
        ticket: Ticket<String>,
        result: Result<MergedResult, ServiceError>,
    ) -> Result<&MergedResult, WorkflowError> {
        self.settle(&ticket)?;
        let merged = result.map_err(|e| WorkflowError::MergeFailed(e.to_string()))?;
        if merged.url.is_empty() || merged.artifact_url.is_empty() {
            return Err(WorkflowError::MergeFailed("missing merged image or archive url".into()));
        }
        tracing::info!(run_id = ?self.run_id, url = %merged.url, "restored faces merged");
        let merged: &MergedResult = self.merged.insert(merged);
        Ok(merged)
    }

    // --- Queries ---

    /// Id of the current run, assigned when an image is chosen.
    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    pub fn source_image(&self) -> Option<&SourceImage> {
        self.source.as_deref()
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    pub fn detected_faces(&self) -> &[DetectedFace] {
        &self.detected
    }

    pub fn selection(&self) -> &BTreeSet<FaceIndex> {
        &self.selection
    }

    pub fn is_selected(&self, index: FaceIndex) -> bool {
        self.selection.contains(&index)
    }

    pub fn restored_faces(&self) -> &[RestoredFace] {
        &self.restored
    }

    pub fn download_flags(&self) -> &[bool] {
        &self.download_flags
    }

    /// Best/worst markers; `None` unless at least two faces are restored.
    pub fn ranking(&self) -> Option<Ranking> {
        self.ranking
    }

    pub fn best_index(&self) -> Option<FaceIndex> {
        self.ranking.map(|r| r.best)
    }

    pub fn worst_index(&self) -> Option<FaceIndex> {
        self.ranking.map(|r| r.worst)
    }

    pub fn merged(&self) -> Option<&MergedResult> {
        self.merged.as_ref()
    }

    /// True once a merge succeeded; further merges are refused until the
    /// restored set changes.
    pub fn merge_done(&self) -> bool {
        self.merged.is_some()
    }

    pub fn is_pending(&self, op: OpKind) -> bool {
        self.pending.contains(&op)
    }

    pub fn pending(&self) -> impl Iterator<Item = OpKind> + '_ {
        self.pending.iter().copied()
    }

    /// Before/after rows in restored order.
    pub fn comparisons(&self) -> Vec<Comparison<'_>> {
        let count = self.restored.len();
        self.restored
            .iter()
            .enumerate()
            .filter_map(|(position, after)| {
                let before = self.detected.iter().find(|d| d.index == after.index)?;
                Some(Comparison {
                    position,
                    before,
                    after,
                    tag: ranking::tag_for(after.index, count, self.ranking),
                    keep: self.download_flags.get(position).copied().unwrap_or(false),
                })
            })
            .collect()
    }

    // --- Internals ---

    fn clear_selection_and_results(&mut self) {
        self.selection.clear();
        self.restored.clear();
        self.download_flags.clear();
        self.ranking = None;
        self.merged = None;
    }

    fn invalidate(&mut self, stage: Stage) {
        for generation in &mut self.generations[stage as usize..] {
            *generation += 1;
        }
    }

    fn ensure_idle(&self, ops: &[OpKind]) -> Result<(), WorkflowError> {
        match ops.iter().copied().find(|op| self.pending.contains(op)) {
            Some(op) => Err(WorkflowError::OperationInProgress(op)),
            None => Ok(()),
        }
    }

    fn issue<T>(&mut self, op: OpKind, stage: Option<Stage>, payload: T) -> Ticket<T> {
        self.pending.insert(op);
        tracing::debug!(%op, "request issued");
        Ticket {
            op,
            guard: stage.map(|s| (s, self.generations[s as usize])),
            payload,
        }
    }

    /// Clear the pending flag and reject responses for an outdated upstream.
    fn settle<T>(&mut self, ticket: &Ticket<T>) -> Result<(), WorkflowError> {
        self.pending.remove(&ticket.op);
        match ticket.guard {
            Some((stage, issued)) if self.generations[stage as usize] != issued => {
                tracing::warn!(op = %ticket.op, ?stage, "discarding stale response");
                Err(WorkflowError::Superseded(ticket.op))
            }
            _ => Ok(()),
        }
    }
}

fn first_duplicate(mut indices: impl Iterator<Item = FaceIndex>) -> Option<FaceIndex> {
    let mut seen = HashSet::new();
    indices.find(|i| !seen.insert(*i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metrics;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    fn detected(index: FaceIndex) -> DetectedFace {
        DetectedFace { index, url: format!("/f{index}") }
    }

    fn restored(index: FaceIndex, psnr: f64, ssim: f64, lpips: f64) -> RestoredFace {
        RestoredFace {
            index,
            url: format!("/r{index}"),
            metrics: Some(Metrics { psnr: Some(psnr), ssim: Some(ssim), lpips: Some(lpips) }),
            score: 0.0,
        }
    }

    fn detection(indices: &[FaceIndex]) -> Detection {
        Detection {
            faces: indices.iter().copied().map(detected).collect(),
            source_path: "inputs/source.png".into(),
        }
    }

    fn merged_result() -> MergedResult {
        MergedResult {
            url: "/static/merged.png".into(),
            metrics: Metrics::default(),
            artifact_url: "/static/merged.zip".into(),
        }
    }

    fn with_image() -> WorkflowState {
        let mut state = WorkflowState::new();
        state.choose_image(PNG_MAGIC.to_vec(), None).unwrap();
        state
    }

    fn with_detection(indices: &[FaceIndex]) -> WorkflowState {
        let mut state = with_image();
        let ticket = state.begin_detect().unwrap();
        state.finish_detect(ticket, Ok(detection(indices))).unwrap();
        state
    }

    fn with_restoration(faces: Vec<RestoredFace>) -> WorkflowState {
        let indices: Vec<FaceIndex> = faces.iter().map(|f| f.index).collect();
        let mut state = with_detection(&indices);
        let ticket = state.begin_restore(Mode::All).unwrap();
        state.finish_restore(ticket, Ok(faces)).unwrap();
        state
    }

    fn two_restored() -> Vec<RestoredFace> {
        vec![restored(0, 32.0, 0.9, 0.1), restored(1, 28.0, 0.8, 0.4)]
    }

    #[test]
    fn test_choose_image_rejects_empty_payload() {
        let mut state = WorkflowState::new();
        let err = state.choose_image(Vec::new(), None).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidImage(_)));
        assert!(state.source_image().is_none());
    }

    #[test]
    fn test_choose_image_clears_everything_downstream() {
        let mut state = with_restoration(two_restored());
        state.toggle_face(0).unwrap();
        state.toggle_download(1).unwrap();
        let ticket = state.begin_merge().unwrap();
        state.finish_merge(ticket, Ok(merged_result())).unwrap();

        let previous = state.run_id();
        let run_id = state.choose_image(PNG_MAGIC.to_vec(), None).unwrap();

        assert_ne!(Some(run_id), previous);
        assert!(state.source_image().is_some());
        assert!(state.source_path().is_none());
        assert!(state.detected_faces().is_empty());
        assert!(state.selection().is_empty());
        assert!(state.restored_faces().is_empty());
        assert!(state.download_flags().is_empty());
        assert!(state.ranking().is_none());
        assert!(state.merged().is_none());
        assert!(!state.merge_done());
    }

    #[test]
    fn test_detect_requires_image() {
        let mut state = WorkflowState::new();
        assert_eq!(state.begin_detect().unwrap_err(), WorkflowError::NoImageChosen);
        assert!(!state.is_pending(OpKind::Detect));
    }

    #[test]
    fn test_detect_stores_faces_and_path() {
        let state = with_detection(&[0, 4, 9]);
        let indices: Vec<_> = state.detected_faces().iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 4, 9]);
        assert_eq!(state.source_path(), Some("inputs/source.png"));
        assert!(!state.is_pending(OpKind::Detect));
    }

    #[test]
    fn test_second_detect_while_pending_is_rejected() {
        let mut state = with_image();
        let ticket = state.begin_detect().unwrap();
        assert!(state.is_pending(OpKind::Detect));
        assert_eq!(
            state.begin_detect().unwrap_err(),
            WorkflowError::OperationInProgress(OpKind::Detect)
        );
        state.finish_detect(ticket, Ok(detection(&[0]))).unwrap();
        assert!(state.begin_detect().is_ok());
    }

    #[test]
    fn test_detect_failure_keeps_state() {
        let mut state = with_restoration(two_restored());
        let ticket = state.begin_detect().unwrap();
        let err = state
            .finish_detect(ticket, Err(ServiceError::Transport("connection refused".into())))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::DetectionFailed(_)));
        assert!(!state.is_pending(OpKind::Detect));
        assert_eq!(state.detected_faces().len(), 2);
        assert_eq!(state.restored_faces().len(), 2);
    }

    #[test]
    fn test_detect_duplicate_indices_are_malformed() {
        let mut state = with_image();
        let ticket = state.begin_detect().unwrap();
        let err = state.finish_detect(ticket, Ok(detection(&[1, 1]))).unwrap_err();
        assert!(matches!(err, WorkflowError::DetectionFailed(_)));
        assert!(state.detected_faces().is_empty());
    }

    #[test]
    fn test_new_detection_resets_downstream() {
        let mut state = with_restoration(two_restored());
        state.toggle_face(1).unwrap();
        let ticket = state.begin_merge().unwrap();
        state.finish_merge(ticket, Ok(merged_result())).unwrap();
        assert!(state.merged().is_some());

        let ticket = state.begin_detect().unwrap();
        state.finish_detect(ticket, Ok(detection(&[5, 6, 7]))).unwrap();
        assert_eq!(state.detected_faces().len(), 3);
        assert!(state.selection().is_empty());
        assert!(state.restored_faces().is_empty());
        assert!(state.download_flags().is_empty());
        assert!(state.ranking().is_none());
        assert!(state.merged().is_none());
        assert!(!state.merge_done());
    }

    #[test]
    fn test_toggle_face() {
        let mut state = with_detection(&[0, 1]);
        assert!(state.toggle_face(1).unwrap());
        assert!(state.is_selected(1));
        assert!(!state.toggle_face(1).unwrap());
        assert!(state.selection().is_empty());
    }

    #[test]
    fn test_toggle_unknown_face_is_rejected() {
        let mut state = with_detection(&[0, 1]);
        assert_eq!(state.toggle_face(7).unwrap_err(), WorkflowError::UnknownFace(7));
        assert!(state.selection().is_empty());
    }

    #[test]
    fn test_restore_selected_with_empty_selection() {
        let mut state = with_detection(&[0, 1]);
        assert_eq!(
            state.begin_restore(Mode::Selected).unwrap_err(),
            WorkflowError::NoFacesChosen
        );
        assert!(!state.is_pending(OpKind::RestoreSelected));
    }

    #[test]
    fn test_restore_before_detection_has_no_faces() {
        let mut state = with_image();
        assert_eq!(state.begin_restore(Mode::All).unwrap_err(), WorkflowError::NoFacesChosen);
    }

    #[test]
    fn test_restore_selected_only_sends_selection() {
        let mut state = with_detection(&[0, 1]);
        state.toggle_face(1).unwrap();
        let ticket = state.begin_restore(Mode::Selected).unwrap();
        assert_eq!(ticket.op(), OpKind::RestoreSelected);
        assert_eq!(ticket.payload(), &vec![detected(1)]);

        state
            .finish_restore(ticket, Ok(vec![restored(1, 30.0, 0.9, 0.2)]))
            .unwrap();
        assert_eq!(state.restored_faces().len(), 1);
        assert!(state.best_index().is_none());
        assert!(state.worst_index().is_none());
        assert_eq!(state.comparisons()[0].tag, Some(FaceTag::OnlyOne));
    }

    #[test]
    fn test_restore_modes_exclude_each_other() {
        let mut state = with_detection(&[0, 1]);
        state.toggle_face(0).unwrap();
        let _ticket = state.begin_restore(Mode::All).unwrap();
        assert_eq!(
            state.begin_restore(Mode::Selected).unwrap_err(),
            WorkflowError::OperationInProgress(OpKind::RestoreAll)
        );
    }

    #[test]
    fn test_restore_ranks_and_resets_flags() {
        let state = with_restoration(two_restored());
        let faces = state.restored_faces();
        assert!((faces[0].score - 112.0).abs() < 1e-9);
        assert!((faces[1].score - 68.0).abs() < 1e-9);
        assert_eq!(state.best_index(), Some(0));
        assert_eq!(state.worst_index(), Some(1));
        assert_eq!(state.download_flags(), &[false, false]);
    }

    #[test]
    fn test_restore_again_clears_merge_and_flags() {
        let mut state = with_restoration(two_restored());
        state.toggle_download(0).unwrap();
        let ticket = state.begin_merge().unwrap();
        state.finish_merge(ticket, Ok(merged_result())).unwrap();
        assert!(state.merge_done());

        let ticket = state.begin_restore(Mode::All).unwrap();
        state
            .finish_restore(
                ticket,
                Ok(vec![
                    restored(0, 30.0, 0.9, 0.1),
                    restored(1, 31.0, 0.9, 0.1),
                ]),
            )
            .unwrap();
        assert!(state.merged().is_none());
        assert!(!state.merge_done());
        assert_eq!(state.download_flags(), &[false, false]);
        assert!(state.begin_merge().is_ok());
    }

    #[test]
    fn test_restore_failure_keeps_previous_results() {
        let mut state = with_restoration(two_restored());
        let ticket = state.begin_restore(Mode::All).unwrap();
        let err = state
            .finish_restore(ticket, Err(ServiceError::Malformed("no restored_faces".into())))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::RestorationFailed(_)));
        assert_eq!(state.restored_faces().len(), 2);
        assert!(!state.is_pending(OpKind::RestoreAll));
    }

    #[test]
    fn test_restore_rejects_undetected_index() {
        let mut state = with_detection(&[0, 1]);
        let ticket = state.begin_restore(Mode::All).unwrap();
        let err = state
            .finish_restore(ticket, Ok(vec![restored(9, 30.0, 0.9, 0.1)]))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::RestorationFailed(_)));
        assert!(state.restored_faces().is_empty());
    }

    #[test]
    fn test_toggle_download_bounds() {
        let mut state = with_restoration(two_restored());
        assert!(state.toggle_download(1).unwrap());
        assert_eq!(state.download_flags(), &[false, true]);
        assert_eq!(
            state.toggle_download(2).unwrap_err(),
            WorkflowError::PositionOutOfRange { position: 2, len: 2 }
        );
    }

    #[test]
    fn test_download_selected_resolves_flags() {
        let mut state = with_restoration(two_restored());
        assert_eq!(
            state.begin_download(Mode::Selected).unwrap_err(),
            WorkflowError::NoFacesChosen
        );
        state.toggle_download(1).unwrap();
        let ticket = state.begin_download(Mode::Selected).unwrap();
        let indices: Vec<_> = ticket.payload().iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![1]);

        // The other mode is an independent operation kind.
        let all = state.begin_download(Mode::All).unwrap();
        assert_eq!(all.payload().len(), 2);
        assert_eq!(
            state.begin_download(Mode::Selected).unwrap_err(),
            WorkflowError::OperationInProgress(OpKind::DownloadSelected)
        );

        let url = state
            .finish_download(ticket, Ok(Artifact { url: "/static/faces.zip".into() }))
            .unwrap();
        assert_eq!(url, "/static/faces.zip");
        let err = state
            .finish_download(all, Err(ServiceError::Status { status: 500, message: "boom".into() }))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::DownloadFailed(_)));
        assert!(!state.is_pending(OpKind::DownloadAll));
        assert!(!state.is_pending(OpKind::DownloadSelected));
    }

    #[test]
    fn test_merge_before_detection() {
        let mut state = with_image();
        assert_eq!(state.begin_merge().unwrap_err(), WorkflowError::MissingSourcePath);
    }

    #[test]
    fn test_merge_with_empty_source_path() {
        let mut state = with_image();
        let ticket = state.begin_detect().unwrap();
        let mut response = detection(&[0]);
        response.source_path.clear();
        state.finish_detect(ticket, Ok(response)).unwrap();
        assert_eq!(state.begin_merge().unwrap_err(), WorkflowError::MissingSourcePath);
    }

    #[test]
    fn test_merge_is_suppressed_once_done() {
        let mut state = with_restoration(two_restored());
        let ticket = state.begin_merge().unwrap();
        assert_eq!(ticket.payload(), "inputs/source.png");
        let merged = state.finish_merge(ticket, Ok(merged_result())).unwrap();
        assert_eq!(merged.metrics.lpips_label(), "N/A");
        assert_eq!(state.begin_merge().unwrap_err(), WorkflowError::AlreadyMerged);
    }

    #[test]
    fn test_merge_failure_leaves_no_result() {
        let mut state = with_restoration(two_restored());
        let ticket = state.begin_merge().unwrap();
        let err = state
            .finish_merge(ticket, Err(ServiceError::Transport("timeout".into())))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::MergeFailed(_)));
        assert!(state.merged().is_none());
        assert!(!state.is_pending(OpKind::Merge));
    }

    #[test]
    fn test_stale_detection_is_discarded() {
        let mut state = with_image();
        let ticket = state.begin_detect().unwrap();
        state.choose_image(PNG_MAGIC.to_vec(), Some("other.png".into())).unwrap();
        let err = state.finish_detect(ticket, Ok(detection(&[0, 1]))).unwrap_err();
        assert_eq!(err, WorkflowError::Superseded(OpKind::Detect));
        assert!(state.detected_faces().is_empty());
        assert!(!state.is_pending(OpKind::Detect));
    }

    #[test]
    fn test_stale_restoration_is_discarded() {
        let mut state = with_detection(&[0, 1]);
        let ticket = state.begin_restore(Mode::All).unwrap();
        let redetect = state.begin_detect().unwrap();
        state.finish_detect(redetect, Ok(detection(&[0, 1]))).unwrap();
        let err = state.finish_restore(ticket, Ok(two_restored())).unwrap_err();
        assert_eq!(err, WorkflowError::Superseded(OpKind::RestoreAll));
        assert!(state.restored_faces().is_empty());
    }

    #[test]
    fn test_stale_merge_is_discarded() {
        let mut state = with_restoration(two_restored());
        let ticket = state.begin_merge().unwrap();
        let restore = state.begin_restore(Mode::All).unwrap();
        state.finish_restore(restore, Ok(two_restored())).unwrap();
        let err = state.finish_merge(ticket, Ok(merged_result())).unwrap_err();
        assert_eq!(err, WorkflowError::Superseded(OpKind::Merge));
        assert!(state.merged().is_none());
    }

    #[test]
    fn test_toggles_proceed_while_restore_pending() {
        let mut state = with_restoration(two_restored());
        let _ticket = state.begin_restore(Mode::All).unwrap();
        assert!(state.toggle_face(0).unwrap());
        assert!(state.toggle_download(0).unwrap());
    }

    #[test]
    fn test_comparisons_pair_before_and_after() {
        let mut state = with_detection(&[3, 8, 11]);
        let ticket = state.begin_restore(Mode::All).unwrap();
        state
            .finish_restore(
                ticket,
                Ok(vec![
                    restored(8, 25.0, 0.7, 0.3),
                    restored(3, 35.0, 0.95, 0.05),
                    restored(11, 30.0, 0.8, 0.2),
                ]),
            )
            .unwrap();
        state.toggle_download(2).unwrap();

        let rows = state.comparisons();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].before.url, "/f8");
        assert_eq!(rows[0].after.url, "/r8");
        assert_eq!(rows[0].tag, Some(FaceTag::Worst));
        assert_eq!(rows[1].tag, Some(FaceTag::Best));
        assert_eq!(rows[2].tag, None);
        assert!(rows[2].keep);
        assert!(!rows[0].keep);
    }
}

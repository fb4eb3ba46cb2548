//! Terminal rendering of workflow state.

use restora_client::AssetHost;
use restora_core::types::{LPIPS_HINT, PSNR_HINT, SSIM_HINT};
use restora_core::{Comparison, DetectedFace, FaceTag, MergedResult, Metrics, OpKind, WorkflowState};

/// Button-style progress text for an in-flight operation.
pub fn progress_label(op: OpKind) -> &'static str {
    match op {
        OpKind::Detect => "Detecting faces...",
        OpKind::RestoreSelected | OpKind::RestoreAll => "Restoring...",
        OpKind::DownloadSelected | OpKind::DownloadAll => "Downloading...",
        OpKind::Merge => "Merging...",
    }
}

pub fn tag_label(tag: FaceTag) -> &'static str {
    match tag {
        FaceTag::Best => "BEST",
        FaceTag::Worst => "WORST",
        FaceTag::OnlyOne => "Only one face restored",
    }
}

pub fn metric_lines(metrics: &Metrics) -> [String; 3] {
    [
        format!("{PSNR_HINT}: {}", metrics.psnr_label()),
        format!("{SSIM_HINT}: {}", metrics.ssim_label()),
        format!("{LPIPS_HINT}: {}", metrics.lpips_label()),
    ]
}

pub fn comparison_header(row: &Comparison<'_>) -> String {
    let mut header = format!("Face {}  score {:.2}", row.after.index, row.after.score);
    if let Some(tag) = row.tag {
        header.push_str(&format!("  [{}]", tag_label(tag)));
    }
    header
}

fn link(assets: &AssetHost, url: &str) -> String {
    assets
        .resolve(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

pub fn print_detected(faces: &[DetectedFace], assets: &AssetHost) {
    println!("Detected faces: {}", faces.len());
    for face in faces {
        println!("  Face {}: {}", face.index, link(assets, &face.url));
    }
}

pub fn print_comparisons(state: &WorkflowState, assets: &AssetHost) {
    println!("Restored faces & metrics:");
    for row in state.comparisons() {
        println!();
        println!("  {}", comparison_header(&row));
        println!("    original: {}", link(assets, &row.before.url));
        println!("    restored: {}", link(assets, &row.after.url));
        if let Some(metrics) = &row.after.metrics {
            for line in metric_lines(metrics) {
                println!("    {line}");
            }
        }
        println!(
            "    download: [{}] (position {})",
            if row.keep { "x" } else { " " },
            row.position
        );
    }
}

pub fn print_merged(merged: &MergedResult, assets: &AssetHost) {
    println!("Merged full image (all faces restored): {}", link(assets, &merged.url));
    for line in metric_lines(&merged.metrics) {
        println!("    {line}");
    }
}

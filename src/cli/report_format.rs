//! Formatting helpers for pool reports.

use std::fmt::Write;

use crate::memory::{CleanSummary, PageReport, UsageReport};

/// Render a usage report with a title banner.
pub fn render_report(title: &str, report: &UsageReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "====================================================");
    let _ = writeln!(out, "  {}", title);
    let _ = writeln!(out, "====================================================");
    let _ = writeln!(
        out,
        "  Status: {:10}  Usage: {} / {} ({:.1}%)",
        report.status,
        format_bytes(report.heap.usage),
        format_bytes(report.heap.budget),
        report.heap.utilization() * 100.0
    );
    let _ = writeln!(out, "  Heap:   {}", format_bytes(report.heap.size));
    if report.pending_frees > 0 {
        let _ = writeln!(out, "  Pending frees: {}", report.pending_frees);
    }
    for page in &report.pages {
        render_page(&mut out, page);
    }
    let _ = writeln!(out);
    let _ = write!(out, "{}", report);
    out
}

fn render_page(out: &mut String, page: &PageReport) {
    let _ = writeln!(
        out,
        "  Page {:<3} {:>10} used  {:>10} free  {:>3} used blocks  {:>3} free blocks",
        page.index,
        format_bytes(page.used_bytes()),
        format_bytes(page.free_bytes()),
        page.used.len(),
        page.free.len()
    );
}

pub fn render_clean_summary(summary: &CleanSummary) -> String {
    format!(
        "Clean pass: {} blocks reclaimed ({}), {} neighbors merged",
        summary.reclaimed,
        format_bytes(summary.reclaimed_bytes),
        summary.merged
    )
}

/// Format bytes in human-readable form.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Block, CoherencyStatus, HeapInfo};

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(64 * 1024 * 1024), "64.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_render_report_banner_and_pages() {
        let report = UsageReport {
            status: CoherencyStatus::Incoherent,
            heap: HeapInfo { size: 8192, budget: 4096, usage: 1024 },
            pending_frees: 2,
            pages: vec![PageReport::new(0, 4096, vec![Block::used(0, 1024)], vec![Block::free(1024, 3072)])],
            fragmentation: None,
        };
        let text = render_report("Before clean", &report);
        assert!(text.contains("Before clean"));
        assert!(text.contains("Usage: 1.0 KB / 4.0 KB (25.0%)"));
        assert!(text.contains("Pending frees: 2"));
        assert!(text.contains("Page 0"));
    }

    #[test]
    fn test_render_clean_summary() {
        let summary = CleanSummary { reclaimed: 3, merged: 2, reclaimed_bytes: 300 };
        assert_eq!(
            render_clean_summary(&summary),
            "Clean pass: 3 blocks reclaimed (300 B), 2 neighbors merged"
        );
    }
}

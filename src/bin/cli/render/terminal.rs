use wikimigrate_lib::migrate::MigrationReport;
use wikimigrate_lib::progress::MigrationStatus;

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
}

/// Wrap `text` in `color` when colors are enabled
pub fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

pub fn status_color(status: MigrationStatus) -> &'static str {
    match status {
        MigrationStatus::Complete => Color::GREEN,
        MigrationStatus::Pending => Color::DIM,
        _ => Color::YELLOW,
    }
}

/// Human-readable summary of a run
pub fn render_report(report: &MigrationReport, use_color: bool) -> String {
    let rows = [
        ("Spaces created", report.spaces_created),
        ("Spaces reused", report.spaces_reused),
        ("Home pages written", report.home_pages_written),
        ("Pages created", report.pages_created),
        ("Pages blocked by parent", report.pages_blocked),
        ("Media uploaded", report.media_uploaded),
        ("Pages patched", report.pages_patched),
        ("Documents completed", report.documents_completed),
        ("Channels completed", report.channels_completed),
        ("Unresolved references", report.unresolved_refs),
    ];

    let mut lines = vec![paint("Migration run", Color::BOLD, use_color)];
    for (label, count) in rows {
        lines.push(format!("  {:<24} {}", label, count));
    }

    let failed = format!("  {:<24} {}", "Failed", report.failed);
    lines.push(if report.has_failures() {
        paint(&failed, Color::RED, use_color)
    } else {
        failed
    });
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_report_has_no_escapes() {
        let report = MigrationReport {
            pages_created: 3,
            failed: 1,
            ..MigrationReport::default()
        };
        let text = render_report(&report, false);

        assert!(text.contains("Pages created"));
        assert!(text.contains("Failed"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_paint_with_color() {
        assert_eq!(paint("ok", Color::GREEN, true), "\x1b[32mok\x1b[0m");
        assert_eq!(paint("ok", Color::GREEN, false), "ok");
    }
}

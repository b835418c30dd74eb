use crate::adapters::summarizer::Summary;
use crate::events::{Event, format_utc};

pub fn render(event: &Event, summary: &Summary) -> String {
    let mut lines = match event {
        Event::MergedPr(pr) => vec![
            "### Pull request merged".to_string(),
            format!("- PR: #{} {}", pr.number, pr.title),
            format!("- URL: {}", pr.url),
            format!("- Merged at: {}", format_utc(pr.merged_at)),
        ],
        Event::Release(rel) => {
            let label = if rel.name == rel.tag_name {
                rel.tag_name.clone()
            } else {
                format!("{} ({})", rel.tag_name, rel.name)
            };
            vec![
                "### Release published".to_string(),
                format!("- Release: {label}"),
                format!("- URL: {}", rel.url),
                format!("- Published at: {}", format_utc(rel.published_at)),
            ]
        }
    };
    lines.extend([
        String::new(),
        "**Overview**".to_string(),
        summary.overview.clone(),
        String::new(),
        "**Details**".to_string(),
        summary.details.clone(),
        String::new(),
        "**Impact**".to_string(),
        summary.impact.clone(),
    ]);
    lines.join("\n")
}

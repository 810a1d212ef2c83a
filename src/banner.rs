//! Startup banner and run summary.

use std::time::Duration;

use crate::consts::{AUTHOR, HOMEPAGE, REPO, format_number};
use crate::llm::TokenUsage;

/// Run configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub report: &'a str,
    pub pages: usize,
    pub model: &'a str,
    pub endpoint: &'a str,
    pub search: &'a str,
    pub archive: &'a str,
}

/// Printed to stderr; stdout carries only the report.
pub fn print_banner(info: &BannerInfo) {
    eprintln!(
        r#"
   ╔═══════════════════════════════════════╗
   ║          B L O O D W O R K            ║
   ║   your lab results, in plain words    ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   repo      {}
   report    {} ({} page{})
   model     {}
   backend   {}
   search    {}
   archive   {}
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        info.report,
        info.pages,
        if info.pages == 1 { "" } else { "s" },
        info.model,
        info.endpoint,
        info.search,
        info.archive,
    );
}

/// Token usage and wall time of a finished run.
pub fn print_run_summary(usage: TokenUsage, elapsed: Duration) {
    if usage.total() > 0 {
        eprintln!(
            "run: {:>6} input + {:>6} output = {:>6} tokens in {:.1}s",
            format_number(usage.input_tokens),
            format_number(usage.output_tokens),
            format_number(usage.total()),
            elapsed.as_secs_f64(),
        );
    } else {
        eprintln!("run: finished in {:.1}s", elapsed.as_secs_f64());
    }
}

/// The disclaimer every report ends with.
pub fn disclaimer() -> &'static str {
    "_This analysis was generated by a language model. It is not medical advice; discuss your results with a qualified clinician._"
}

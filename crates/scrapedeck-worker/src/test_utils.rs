//! Test utilities for worker plumbing
//!
//! Shell-script stand-ins for the extraction worker. Unix only.

use std::path::PathBuf;

use crate::resolver::{StaticResolver, WorkerInvocation};

/// Invocation that runs `script` through `/bin/sh -c`.
///
/// Job arguments appended after the prefix become the script's `$1`, `$2`, ...
pub fn sh_invocation(script: &str) -> WorkerInvocation {
    WorkerInvocation {
        executable: PathBuf::from("/bin/sh"),
        prefix_args: vec![
            "-c".to_string(),
            script.to_string(),
            // $0 for the script
            "worker".to_string(),
        ],
        working_dir: std::env::temp_dir(),
    }
}

/// Resolver wrapping [`sh_invocation`]
pub fn sh_resolver(script: &str) -> StaticResolver {
    StaticResolver::new(sh_invocation(script))
}

/// Worker that never finishes on its own.
///
/// `exec` replaces the shell so the kill reaches the sleeping process directly.
pub fn sleeping_invocation() -> WorkerInvocation {
    sh_invocation("exec sleep 60")
}

/// Script emitting a realistic two-product run on stdout, with loguru-style
/// lines on stderr.
pub fn scripted_run(exit_code: i32) -> String {
    format!(
        r#"echo 'EVENT:{{"type":"scrape_start","data":{{"total_skus":2}},"timestamp":"t1"}}'
echo '2026-01-12 10:31:07 | INFO     | src.orchestrator:scrape_products - Scraping kelly' >&2
echo 'EVENT:{{"type":"product_complete","data":{{"sku":"kelly","success":true}},"timestamp":"t2"}}'
echo 'Processing megaphone'
echo 'EVENT:{{"type":"product_complete","data":{{"sku":"megaphone","success":false}},"timestamp":"t3"}}'
echo 'EVENT:{{"type":"scrape_complete","data":{{"success_count":1,"failure_count":1}},"timestamp":"t4"}}'
exit {exit_code}"#
    )
}

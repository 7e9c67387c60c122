//! Smoke test script generation.
//!
//! The template assumes the completion-callback page API the substituted
//! backend inherited from the engine it replaces. It is a compatibility
//! shim: when the backend protocol changes, only [`render`] changes.

use std::path::Path;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::core::artifact::SmokeScript;
use crate::core::error::{Step, StepError};
use crate::util::fs::write_atomic;
use crate::util::hash::sha256_str;

/// File name of the generated script inside a leg's output directory.
pub const SCRIPT_NAME: &str = "smoke.js";

/// Generate the smoke script for `url`, passing when the backend reports
/// `sentinel` as the page status.
///
/// Pure: the same inputs always produce byte-identical contents.
pub fn generate(url: &str, sentinel: &str) -> Result<SmokeScript> {
    let parsed = Url::parse(url).with_context(|| format!("invalid smoke test URL `{}`", url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!(
            "smoke test URL must use http or https, got `{}`",
            parsed.scheme()
        );
    }
    if sentinel.trim().is_empty() || sentinel.contains(['\n', '\r']) {
        bail!("smoke test sentinel must be a single non-empty line");
    }

    let url = parsed.as_str().to_string();
    let contents = render(&url, sentinel);
    let digest = sha256_str(&contents);

    Ok(SmokeScript {
        url,
        sentinel: sentinel.to_string(),
        contents,
        digest,
        path: None,
    })
}

/// Write the script into `out`, returning it with its path set.
pub fn write(script: &SmokeScript, out: &Path) -> Result<SmokeScript, StepError> {
    let path = out.join(SCRIPT_NAME);
    write_atomic(&path, script.contents.as_bytes())
        .map_err(|e| StepError::failed(Step::SmokeTest, format!("{:#}", e)))?;
    Ok(SmokeScript {
        path: Some(path),
        ..script.clone()
    })
}

fn render(url: &str, sentinel: &str) -> String {
    let url = js_string(url);
    let sentinel = js_string(sentinel);
    format!(
        r#"// Generated by quay. Do not edit.
var page = require('webpage').create();
page.open({url}, function (status) {{
    console.log(status);
    console.log(page.evaluate(function () {{
        return document.title;
    }}));
    phantom.exit(status === {sentinel} ? 0 : 1);
}});
"#
    )
}

/// A double-quoted JavaScript string literal.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s.escape_default()))
}

//! Page-side snippets evaluated through the browser capability.

pub const CURRENT_TIME: &str = "(() => { const v = document.querySelector('video'); \
     return v && Number.isFinite(v.currentTime) ? v.currentTime : null; })()";

/// Playback position once the player has metadata, `null` before that.
/// `currentTime` already reads 0 while the stream is still attaching.
pub const LIVE_EDGE: &str = "(() => { const v = document.querySelector('video'); \
     if (!v || v.readyState < 1 || Number.isNaN(v.duration)) return null; \
     return Number.isFinite(v.currentTime) ? v.currentTime : null; })()";

pub const PLAY: &str = "(() => { const v = document.querySelector('video'); \
     if (!v) return false; v.muted = true; const p = v.play(); if (p) p.catch(() => {}); return true; })()";

const SEEK_FN: &str = "(/*seek*/ (t) => { const v = document.querySelector('video'); \
     if (!v) return false; v.currentTime = t; return true; })";

const STEP_FN: &str = "(/*step*/ (d) => { const v = document.querySelector('video'); \
     if (!v) return false; v.currentTime += d; return true; })";

/// Moves playback to `target` seconds from the start of the broadcast buffer.
pub fn seek(target: f64) -> String {
    format!("{}({:.3})", SEEK_FN, target.max(0.0))
}

/// Moves playback forward by `delta` seconds.
pub fn step(delta: f64) -> String {
    format!("{}({:.3})", STEP_FN, delta)
}

/// Visible elements matching `selector` as `[{ index, text }]`.
pub fn visible_elements(selector: &str) -> String {
    let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "Array.from(document.querySelectorAll({})).map((el, index) => {{ \
            const r = el.getBoundingClientRect(); \
            const s = window.getComputedStyle(el); \
            const visible = r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; \
            return {{ index, text: (el.innerText || el.textContent || '').trim(), visible }}; \
        }}).filter(e => e.visible).map(({{ index, text }}) => ({{ index, text }}))",
        quoted
    )
}

/// Clicks the `index`-th element matching `selector` if its text is still
/// `text`. Evaluates to whether the click happened.
pub fn click_element(selector: &str, index: usize, text: &str) -> String {
    let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    let expected = serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "(() => {{ const el = document.querySelectorAll({})[{}]; \
            if (!el || (el.innerText || el.textContent || '').trim() !== {}) return false; \
            el.click(); return true; }})()",
        quoted, index, expected
    )
}

/// Argument of a script built by [`seek`] or [`step`], and which of the two it is.
#[cfg(test)]
pub fn parse_call(script: &str) -> Option<(&'static str, f64)> {
    let kind = if script.starts_with(SEEK_FN) {
        "seek"
    } else if script.starts_with(STEP_FN) {
        "step"
    } else {
        return None;
    };
    let (_, arg) = script.rsplit_once(")(")?;
    arg.trim_end_matches(')').parse().ok().map(|v| (kind, v))
}

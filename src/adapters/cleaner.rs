//! Normalization of generated scene scripts and responses.
//!
//! Every script handed to the pipeline has exactly one entry class named
//! `GeneratedScene` that subclasses `Scene`.

use std::sync::OnceLock;

use regex::Regex;

/// Class name the renderer is invoked with
pub const SCENE_CLASS: &str = "GeneratedScene";

/// Separator between scene code and narration in a generation response
pub const NARRATION_MARKER: &str = "---TIMED_TRANSCRIPT_START---";

const PLACEHOLDER_SCENE: &str = "from manim import *\n\n\
class GeneratedScene(Scene):\n    \
def construct(self):\n        \
self.add(Text('Error: Scene could not be generated'))\n";

fn fence_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^```(?:python|py)?[ \t]*$").expect("valid regex"))
}

fn fence_close() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^```[ \t]*$").expect("valid regex"))
}

fn class_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^class[ \t]+(\w+)[ \t]*(?:\(([^)]*)\))?[ \t]*:").expect("valid regex")
    })
}

/// Clean a raw scene script.
///
/// Strips markdown fences, escapes `\c`, renames the first class to
/// `GeneratedScene` (adding a `Scene` base when it has none) and falls back
/// to a placeholder scene when no class is present.
pub fn clean_scene_code(raw: &str) -> String {
    let without_open = fence_open().replace_all(raw, "");
    let code = fence_close().replace_all(&without_open, "");
    let code = code.trim().replace(r"\c", r"\\c");

    let Some(caps) = class_header().captures(&code) else {
        return PLACEHOLDER_SCENE.to_string();
    };

    let Some(header) = caps.get(0) else {
        return PLACEHOLDER_SCENE.to_string();
    };
    let bases = caps
        .get(2)
        .map(|m| m.as_str().trim())
        .filter(|b| !b.is_empty())
        .map(|b| if b.contains("Scene") { b.to_string() } else { format!("Scene, {}", b) })
        .unwrap_or_else(|| "Scene".to_string());

    let mut cleaned = String::with_capacity(code.len() + 16);
    cleaned.push_str(&code[..header.start()]);
    cleaned.push_str(&format!("class {}({}):", SCENE_CLASS, bases));
    cleaned.push_str(&code[header.end()..]);

    if !cleaned.contains("import") {
        cleaned.insert_str(0, "from manim import *\n\n");
    }

    cleaned
}

/// Split a generation response into scene code and narration
pub fn split_response(response: &str) -> (String, Option<String>) {
    match response.split_once(NARRATION_MARKER) {
        Some((code, narration)) => {
            let narration = narration.trim();
            let narration = (!narration.is_empty()).then(|| narration.to_string());
            (code.trim().to_string(), narration)
        }
        None => (response.trim().to_string(), None),
    }
}

/// Narration spoken when the generator produced none
pub fn default_narration(prompt: &str) -> String {
    format!("This video explains {} step by step.", prompt)
}

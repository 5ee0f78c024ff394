//! Prompt templates for the text generator.

use super::cleaner::{NARRATION_MARKER, SCENE_CLASS};

/// Prompt asking for a scene script plus narration for `topic`
pub fn generation_prompt(topic: &str) -> String {
    format!(
        r#"You write Manim Community Edition (v0.19) scripts for short educational videos.

Topic: "{topic}"

Rules:
- Start with `from manim import *`. Import numpy as np only when needed.
- Define exactly one scene class named {SCENE_CLASS} that subclasses Scene.
- Use only built-in shapes (Circle, Square, Rectangle, Triangle, Line, Arrow, Dot, Polygon), Text and Axes.
- Do not use MathTex, Tex or any LaTeX. Do not use ManimGL syntax.
- Keep every object inside x in [-5.5, 5.5] and y in [-2.8, 2.8]; position with move_to, next_to and to_edge.
- Clear the screen with `self.play(FadeOut(Group(*self.mobjects)))` before each new diagram.
- On-screen text is limited to titles and labels. Explanations go into the narration.
- End the scene with `self.wait(1)`.

Output format, with nothing before or after:
<python code for the scene>
{NARRATION_MARKER}
<plain English narration for the whole video, no timestamps or stage directions>
"#
    )
}

/// Prompt asking to fix layout problems in a script
pub fn alignment_prompt(code: &str) -> String {
    format!(
        r#"You fix layout problems in Manim Community Edition scripts.

Fix overlapping text and objects, elements outside the visible frame
(x in [-5.5, 5.5], y in [-2.8, 2.8]) and inconsistent spacing. Keep the
animation logic and the class name {SCENE_CLASS} unchanged.

Return only the complete corrected Python script, without markdown.

--- CODE START ---
{code}
--- CODE END ---
"#
    )
}

/// Prompt asking to repair a script that failed its compile check
pub fn repair_prompt(code: &str, error_output: &str, topic: &str) -> String {
    let code = if code.is_empty() { "NO_ORIGINAL_CODE_PROVIDED" } else { code };
    let error_output = if error_output.is_empty() {
        "NO_ERROR_OUTPUT_PROVIDED"
    } else {
        error_output
    };

    format!(
        r#"Fix the following Manim Community Edition (v0.19) script so that it runs without errors.
Topic: {topic}

--- ORIGINAL CODE START ---
{code}
--- ORIGINAL CODE END ---

--- ERROR OUTPUT START ---
{error_output}
--- ERROR OUTPUT END ---

Instructions:
1. Return only the corrected Python code. No explanations, no markdown.
2. The scene class is named {SCENE_CLASS} and inherits from Scene.
3. Use only documented Manim CE functions; no custom VMobject classes.
4. Keep layouts inside x in [-5.5, 5.5] and y in [-2.8, 2.8].
5. End with self.wait(1) or longer.
"#
    )
}

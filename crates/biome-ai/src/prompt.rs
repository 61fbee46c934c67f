/// Grid extent along both horizontal axes.
pub const GRID_SIZE: i64 = 300;
pub const MIN_Y: i64 = -64;
pub const MAX_Y: i64 = 256;
/// Target band for base terrain height.
pub const SURFACE_BAND: (i64, i64) = (50, 80);

/// Renders the instruction text sent to the model for a given theme.
///
/// Pure string construction; the theme is embedded verbatim, quoted.
pub fn build_prompt(theme: &str) -> String {
    let (band_low, band_high) = SURFACE_BAND;
    format!(
        r#"You are generating procedural terrain for a Minecraft-like block grid.

Write a Rhai script that builds an array of block records for a {grid}x{grid} terrain grid and emits it as a JSON array.

Rules:
- x and z range from 0 to {max_xz}.
- y ranges from {min_y} to {max_y}; keep base terrain height between {band_low} and {band_high}.
- Build each record with the provided helper: block_record(x, y, z, "minecraft:block_id").
- Collect records into an array and call emit_blocks(records) exactly once at the end.
- Use only the Rhai language and the provided helpers. No imports, no file or network access, no timers, no external libraries.
- Vary the height with your own deterministic noise-like function written in Rhai (for example layered trigonometric or hash-based variation).
- Choose block ids that fit the theme for surface, subsurface, and feature blocks.

Biome theme: "{theme}"

Return only the Rhai script. No prose, no explanations, no markdown fences."#,
        grid = GRID_SIZE,
        max_xz = GRID_SIZE - 1,
        min_y = MIN_Y,
        max_y = MAX_Y,
    )
}

/// Removes markdown code-fence delimiter lines from a model reply.
///
/// Any line whose trimmed content starts with ``` is dropped (the fence's
/// language tag rides on the same line); everything else is kept untouched.
pub fn strip_code_fences(reply: &str) -> String {
    reply
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

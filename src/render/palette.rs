pub type Rgb = [u8; 3];

pub const DEFAULT_FG: Rgb = [229, 229, 229];
pub const DEFAULT_BG: Rgb = [30, 30, 30];

/// The 16 named colors, in SGR index order (30-37, then 90-97).
const NAMED: [(&str, Rgb); 16] = [
    ("black", [0, 0, 0]),
    ("red", [205, 49, 49]),
    ("green", [13, 188, 121]),
    ("yellow", [229, 229, 16]),
    ("blue", [36, 114, 200]),
    ("magenta", [188, 63, 188]),
    ("cyan", [17, 168, 205]),
    ("white", [229, 229, 229]),
    ("brightblack", [102, 102, 102]),
    ("brightred", [241, 76, 76]),
    ("brightgreen", [35, 209, 139]),
    ("brightyellow", [245, 245, 67]),
    ("brightblue", [59, 142, 234]),
    ("brightmagenta", [214, 112, 214]),
    ("brightcyan", [41, 184, 219]),
    ("brightwhite", [255, 255, 255]),
];

const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

/// xterm 256-color palette entry.
pub fn indexed(i: u8) -> Rgb {
    match i {
        0..=15 => NAMED[i as usize].1,
        16..=231 => {
            let i = i - 16;
            [
                CUBE_LEVELS[(i / 36) as usize],
                CUBE_LEVELS[((i / 6) % 6) as usize],
                CUBE_LEVELS[(i % 6) as usize],
            ]
        }
        _ => {
            let level = 8 + (i - 232) * 10;
            [level, level, level]
        }
    }
}

/// Resolve an emulator color, or `default` when the cell uses the default.
pub fn resolve(color: Option<avt::Color>, default: Rgb) -> Rgb {
    match color {
        None => default,
        Some(avt::Color::Indexed(i)) => indexed(i),
        Some(avt::Color::RGB(rgb)) => [rgb.r, rgb.g, rgb.b],
    }
}

/// Parse a color name (`brightred`, `Bright Red`) or
/// six hex digits with an optional leading `#`.
pub fn parse_color(s: &str) -> Option<Rgb> {
    let name: String = s
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if let Some((_, rgb)) = NAMED.iter().find(|(n, _)| *n == name) {
        return Some(*rgb);
    }
    let hex = name.strip_prefix('#').unwrap_or(&name);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

/// [`parse_color`], falling back to `default`.
pub fn parse_color_or(s: &str, default: Rgb) -> Rgb {
    parse_color(s).unwrap_or(default)
}

//! Style token parsing and the colour theme they compile into.
//!
//! Carried forward closely from the donor's `ColorTheme` (preset
//! constructors, `Attr` accessor methods) but reshaped onto peco's own
//! config-file grammar: each of the seven style categories
//! (`Basic|Query|Matched|Selected|SavedSelection|Prompt|Context`) is a list
//! of tokens folded left-to-right into an `Attr`, rather than the donor's
//! single comma-separated `key:value` string.
use tuikit::attr::{Attr, Color, Effect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleCategory {
    Basic,
    Query,
    Matched,
    Selected,
    SavedSelection,
    Prompt,
    Context,
}

impl StyleCategory {
    pub fn name(self) -> &'static str {
        match self {
            StyleCategory::Basic => "Basic",
            StyleCategory::Query => "Query",
            StyleCategory::Matched => "Matched",
            StyleCategory::Selected => "Selected",
            StyleCategory::SavedSelection => "SavedSelection",
            StyleCategory::Prompt => "Prompt",
            StyleCategory::Context => "Context",
        }
    }
}

/// Parse one style token (`red`, `on_red`, `bold`, `underline`, `reverse`,
/// `on_bold`, `N`, `on_N`, `#RRGGBB`, `on_#RRGGBB`) and fold it into `attr`.
/// Unknown tokens are ignored.
pub fn apply_style_token(attr: &mut Attr, token: &str) {
    let (on_bg, rest) = match token.strip_prefix("on_") {
        Some(rest) => (true, rest),
        None => (false, token),
    };

    if rest == "bold" {
        attr.effect |= Effect::BOLD;
        return;
    }
    if rest == "underline" {
        attr.effect |= Effect::UNDERLINE;
        return;
    }
    if rest == "reverse" {
        attr.effect |= Effect::REVERSE;
        return;
    }

    let color = if let Some(hex) = rest.strip_prefix('#') {
        parse_truecolor(hex)
    } else if let Ok(n) = rest.parse::<u8>() {
        Some(Color::AnsiValue(n))
    } else {
        named_color(rest)
    };

    if let Some(color) = color {
        if on_bg {
            attr.bg = color;
        } else {
            attr.fg = color;
        }
    }
}

fn parse_truecolor(hex: &str) -> Option<Color> {
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Color::Rgb(r, g, b))
}

fn named_color(name: &str) -> Option<Color> {
    Some(match name {
        "black" => Color::BLACK,
        "red" => Color::RED,
        "green" => Color::GREEN,
        "yellow" => Color::YELLOW,
        "blue" => Color::BLUE,
        "magenta" => Color::MAGENTA,
        "cyan" => Color::CYAN,
        "white" => Color::WHITE,
        "default" => Color::Default,
        _ => return None,
    })
}

/// Compile a list of style tokens (as they'd appear under a Style category
/// in the config file) into an `Attr`.
pub fn compile_style(tokens: &[String]) -> Attr {
    let mut attr = Attr::default();
    for token in tokens {
        apply_style_token(&mut attr, token);
    }
    attr
}

#[rustfmt::skip]
lazy_static! {
    pub static ref DEFAULT_THEME: ColorTheme = ColorTheme::dark256();
}

/// The resolved style for every category, computed once from config at
/// startup.
#[derive(Debug, Clone)]
pub struct ColorTheme {
    basic: Attr,
    query: Attr,
    matched: Attr,
    selected: Attr,
    saved_selection: Attr,
    prompt: Attr,
    context: Attr,
}

impl ColorTheme {
    pub fn basic(&self) -> Attr {
        self.basic
    }
    pub fn query(&self) -> Attr {
        self.query
    }
    pub fn matched(&self) -> Attr {
        self.matched
    }
    pub fn selected(&self) -> Attr {
        self.selected
    }
    pub fn saved_selection(&self) -> Attr {
        self.saved_selection
    }
    pub fn prompt(&self) -> Attr {
        self.prompt
    }
    pub fn context(&self) -> Attr {
        self.context
    }

    pub fn category(&self, category: StyleCategory) -> Attr {
        match category {
            StyleCategory::Basic => self.basic,
            StyleCategory::Query => self.query,
            StyleCategory::Matched => self.matched,
            StyleCategory::Selected => self.selected,
            StyleCategory::SavedSelection => self.saved_selection,
            StyleCategory::Prompt => self.prompt,
            StyleCategory::Context => self.context,
        }
    }

    pub fn empty() -> Self {
        ColorTheme {
            basic: Attr::default(),
            query: Attr::default(),
            matched: Attr {
                effect: Effect::UNDERLINE,
                ..Attr::default()
            },
            selected: Attr {
                effect: Effect::REVERSE,
                ..Attr::default()
            },
            saved_selection: Attr::default(),
            prompt: Attr::default(),
            context: Attr::default(),
        }
    }

    pub fn dark256() -> Self {
        ColorTheme {
            basic: Attr::default(),
            query: Attr {
                fg: Color::AnsiValue(110),
                ..Attr::default()
            },
            matched: Attr {
                fg: Color::AnsiValue(108),
                effect: Effect::BOLD,
                ..Attr::default()
            },
            selected: Attr {
                fg: Color::AnsiValue(168),
                effect: Effect::REVERSE,
                ..Attr::default()
            },
            saved_selection: Attr {
                fg: Color::AnsiValue(161),
                effect: Effect::REVERSE,
                ..Attr::default()
            },
            prompt: Attr {
                fg: Color::AnsiValue(110),
                ..Attr::default()
            },
            context: Attr {
                fg: Color::AnsiValue(59),
                ..Attr::default()
            },
        }
    }

    /// Build a theme from explicit per-category token lists, as they'd be
    /// decoded out of the config file's Style section.
    pub fn from_style_map(map: &std::collections::HashMap<String, Vec<String>>) -> Self {
        let mut theme = ColorTheme::dark256();
        let categories = [
            (StyleCategory::Basic, "Basic"),
            (StyleCategory::Query, "Query"),
            (StyleCategory::Matched, "Matched"),
            (StyleCategory::Selected, "Selected"),
            (StyleCategory::SavedSelection, "SavedSelection"),
            (StyleCategory::Prompt, "Prompt"),
            (StyleCategory::Context, "Context"),
        ];
        for (category, key) in categories {
            if let Some(tokens) = map.get(key) {
                let attr = compile_style(tokens);
                theme.set(category, attr);
            }
        }
        theme
    }

    fn set(&mut self, category: StyleCategory, attr: Attr) {
        match category {
            StyleCategory::Basic => self.basic = attr,
            StyleCategory::Query => self.query = attr,
            StyleCategory::Matched => self.matched = attr,
            StyleCategory::Selected => self.selected = attr,
            StyleCategory::SavedSelection => self.saved_selection = attr,
            StyleCategory::Prompt => self.prompt = attr,
            StyleCategory::Context => self.context = attr,
        }
    }
}

impl Default for ColorTheme {
    fn default() -> Self {
        ColorTheme::dark256()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_color_and_on_variant() {
        let mut attr = Attr::default();
        apply_style_token(&mut attr, "red");
        apply_style_token(&mut attr, "on_blue");
        assert_eq!(attr.fg, Color::RED);
        assert_eq!(attr.bg, Color::BLUE);
    }

    #[test]
    fn numeric_256_color() {
        let mut attr = Attr::default();
        apply_style_token(&mut attr, "202");
        apply_style_token(&mut attr, "on_16");
        assert_eq!(attr.fg, Color::AnsiValue(202));
        assert_eq!(attr.bg, Color::AnsiValue(16));
    }

    #[test]
    fn truecolor_hex() {
        let mut attr = Attr::default();
        apply_style_token(&mut attr, "#ff00aa");
        assert_eq!(attr.fg, Color::Rgb(0xff, 0x00, 0xaa));
    }

    #[test]
    fn attrs_fold_with_effect_flags() {
        let attr = compile_style(&["bold".to_string(), "underline".to_string(), "red".to_string()]);
        assert!(attr.effect.contains(Effect::BOLD));
        assert!(attr.effect.contains(Effect::UNDERLINE));
        assert_eq!(attr.fg, Color::RED);
    }

    #[test]
    fn style_map_overrides_only_named_categories() {
        let mut map = std::collections::HashMap::new();
        map.insert("Matched".to_string(), vec!["green".to_string()]);
        let theme = ColorTheme::from_style_map(&map);
        assert_eq!(theme.matched().fg, Color::GREEN);
        // Basic was untouched, so it still matches the dark256 default.
        assert_eq!(theme.basic().fg, ColorTheme::dark256().basic().fg);
    }
}

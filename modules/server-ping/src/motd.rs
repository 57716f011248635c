//! Rendering of the status `description` into legacy `§`-coded text and plain text.

use serde_json::Value;

const SECTION: char = '§';

fn color_code(name: &str) -> Option<char> {
    Some(match name {
        "black" => '0',
        "dark_blue" => '1',
        "dark_green" => '2',
        "dark_aqua" => '3',
        "dark_red" => '4',
        "dark_purple" => '5',
        "gold" => '6',
        "gray" => '7',
        "dark_gray" => '8',
        "blue" => '9',
        "green" => 'a',
        "aqua" => 'b',
        "red" => 'c',
        "light_purple" => 'd',
        "yellow" => 'e',
        "white" => 'f',
        "reset" => 'r',
        _ => return None,
    })
}

const FORMATS: &[(&str, char)] = &[
    ("obfuscated", 'k'),
    ("bold", 'l'),
    ("strikethrough", 'm'),
    ("underlined", 'n'),
    ("italic", 'o'),
];

/// Render a description value into its `§`-coded form. Components inherit
/// colour and formats from their parent; every text run is preceded by the
/// codes of its effective style.
pub fn to_legacy(description: &Value) -> String {
    let mut r = Renderer::default();
    render(description, &Style::default(), &mut r);
    if !r.current.is_plain() {
        r.out.push(SECTION);
        r.out.push('r');
    }
    r.out
}

/// Strip every `§x` formatting pair.
pub fn strip_codes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == SECTION {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Style {
    color: Option<char>,
    /// Indexed like `FORMATS`.
    formats: [bool; 5],
}

impl Style {
    fn is_plain(&self) -> bool {
        self.color.is_none() && !self.formats.iter().any(|f| *f)
    }

    /// This style overlaid with the fields `map` sets explicitly.
    fn child(&self, map: &serde_json::Map<String, Value>) -> Style {
        let mut s = self.clone();
        match map.get("color").and_then(Value::as_str) {
            Some("reset") => s = Style::default(),
            Some(name) => {
                if let Some(code) = color_code(name) {
                    s.color = Some(code);
                }
            }
            None => {}
        }
        for (i, (key, _)) in FORMATS.iter().enumerate() {
            if let Some(on) = map.get(*key).and_then(Value::as_bool) {
                s.formats[i] = on;
            }
        }
        s
    }
}

#[derive(Default)]
struct Renderer {
    out: String,
    /// Style in effect at the end of `out`.
    current: Style,
}

impl Renderer {
    fn text(&mut self, text: &str, style: &Style) {
        if text.is_empty() {
            return;
        }
        self.switch(style);
        self.out.push_str(text);
    }

    fn switch(&mut self, want: &Style) {
        if self.current == *want {
            return;
        }
        // Legacy codes can only add formats; anything else needs a reset.
        let additive = self.current.color == want.color
            && self.current.formats.iter().zip(want.formats.iter()).all(|(have, w)| !*have || *w);
        if !additive {
            if !self.current.is_plain() {
                self.out.push(SECTION);
                self.out.push('r');
            }
            self.current = Style::default();
            if let Some(code) = want.color {
                self.out.push(SECTION);
                self.out.push(code);
            }
        }
        for (i, (_, code)) in FORMATS.iter().enumerate() {
            if want.formats[i] && !self.current.formats[i] {
                self.out.push(SECTION);
                self.out.push(*code);
            }
        }
        self.current = want.clone();
    }
}

fn render(node: &Value, style: &Style, r: &mut Renderer) {
    match node {
        Value::String(s) => r.text(s, style),
        Value::Array(items) => {
            for item in items {
                render(item, style, r);
            }
        }
        Value::Object(map) => {
            let own = style.child(map);
            if let Some(text) = map.get("text") {
                render(text, &own, r);
            }
            if let Some(Value::Array(extra)) = map.get("extra") {
                for child in extra {
                    render(child, &own, r);
                }
            }
        }
        Value::Number(n) => r.text(&n.to_string(), style),
        Value::Bool(b) => r.text(if *b { "true" } else { "false" }, style),
        Value::Null => {}
    }
}

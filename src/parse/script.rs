//! Script parser (`spec.md` §4.5, formats `script_python`/`script_js`/
//! `script_ts`/`script_shell`).
//!
//! Extracts symbol-level sections (top-level functions, classes, etc.) while
//! preserving the module header and footer exactly. Gaps between symbols
//! (blank lines) are owned by the preceding symbol so concatenation
//! reproduces the original bytes.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::{FileFormat, ParsedSection, SectionKind};

struct Symbol {
    name: String,
    /// 0-based line index of the symbol's declaration line.
    line_idx: usize,
    /// 0-based line index, exclusive, of where this symbol's body ends
    /// (terminator line, inclusive of that line).
    end_line: usize,
}

fn python_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(def|class)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

fn js_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][A-Za-z0-9_$]*)|^(?:export\s+)?(?:default\s+)?class\s+([A-Za-z_$][A-Za-z0-9_$]*)|^(?:export\s+)?(?:interface|enum|namespace|type)\s+([A-Za-z_$][A-Za-z0-9_$]*)|^(?:export\s+)?const\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*(?:function|\([^)]*\)\s*=>|async)|^exports\.([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*function",
        )
        .unwrap()
    })
}

fn shell_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:function\s+([A-Za-z_][A-Za-z0-9_]*)|([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*\))")
            .unwrap()
    })
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn find_python_symbols(lines: &[&str]) -> Vec<Symbol> {
    let re = python_header_re();
    let mut symbols = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let bare = lines[i].trim_end_matches(['\n', '\r']);
        if indent_of(bare) == 0 {
            if let Some(caps) = re.captures(bare) {
                let name = caps.get(2).unwrap().as_str().to_string();
                let mut end = i + 1;
                while end < lines.len() {
                    let candidate = lines[end].trim_end_matches(['\n', '\r']);
                    if candidate.trim().is_empty() {
                        end += 1;
                        continue;
                    }
                    if indent_of(candidate) == 0 {
                        break;
                    }
                    end += 1;
                }
                // Trim trailing blank lines off the symbol body; they belong
                // to the gap, which is re-attached below.
                let mut body_end = end;
                while body_end > i + 1 {
                    let prev = lines[body_end - 1].trim_end_matches(['\n', '\r']);
                    if prev.trim().is_empty() {
                        body_end -= 1;
                    } else {
                        break;
                    }
                }
                symbols.push(Symbol {
                    name,
                    line_idx: i,
                    end_line: body_end,
                });
                i = end;
                continue;
            }
        }
        i += 1;
    }
    symbols
}

fn find_brace_symbols(lines: &[&str], re: &Regex) -> Vec<Symbol> {
    let mut symbols = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let bare = lines[i].trim_end_matches(['\n', '\r']);
        if let Some(caps) = re.captures(bare) {
            let name = caps
                .iter()
                .skip(1)
                .find_map(|m| m.map(|m| m.as_str().to_string()))
                .unwrap_or_default();
            let mut depth = 0i32;
            let mut seen_open = false;
            let mut end = i;
            'outer: for (j, l) in lines.iter().enumerate().skip(i) {
                let text = l.trim_end_matches(['\n', '\r']);
                for ch in text.chars() {
                    match ch {
                        '{' => {
                            depth += 1;
                            seen_open = true;
                        }
                        '}' => {
                            depth -= 1;
                            if seen_open && depth <= 0 {
                                end = j;
                                break 'outer;
                            }
                        }
                        _ => {}
                    }
                }
                if !seen_open && j > i + 2 {
                    // no brace body found within a few lines; treat as a
                    // one-line declaration (e.g. an arrow-function const).
                    end = j;
                    break;
                }
            }
            symbols.push(Symbol {
                name,
                line_idx: i,
                end_line: end + 1,
            });
            i = end + 1;
            continue;
        }
        i += 1;
    }
    symbols
}

fn find_symbols(format: FileFormat, lines: &[&str]) -> Vec<Symbol> {
    match format {
        FileFormat::ScriptPython => find_python_symbols(lines),
        FileFormat::ScriptJs | FileFormat::ScriptTs => find_brace_symbols(lines, js_header_re()),
        FileFormat::ScriptShell => find_brace_symbols(lines, shell_header_re()),
        _ => Vec::new(),
    }
}

/// Parses `content` (the whole file; scripts carry no frontmatter) into
/// `module` / symbol / `footer` sections per `spec.md` §4.5.
#[must_use]
pub fn parse(format: FileFormat, content: &str) -> Vec<ParsedSection> {
    let lines: Vec<&str> = if content.is_empty() {
        Vec::new()
    } else {
        content.split_inclusive('\n').collect()
    };

    let symbols = find_symbols(format, &lines);

    if symbols.is_empty() {
        return vec![ParsedSection {
            parent: None,
            order_index: 0,
            kind: SectionKind::Module,
            title: "module".to_string(),
            content: lines.concat(),
            closing_tag_prefix: String::new(),
            line_start: 1,
            line_end: lines.len().max(1),
        }];
    }

    let mut sections = Vec::new();
    let mut order_index = 0;

    if symbols[0].line_idx > 0 {
        sections.push(ParsedSection {
            parent: None,
            order_index,
            kind: SectionKind::Module,
            title: "module".to_string(),
            content: lines[..symbols[0].line_idx].concat(),
            closing_tag_prefix: String::new(),
            line_start: 1,
            line_end: symbols[0].line_idx,
        });
        order_index += 1;
    }

    for (si, sym) in symbols.iter().enumerate() {
        // Extend through any blank-line gap up to the next symbol's first
        // line; the gap is owned by the preceding symbol.
        let content_end = symbols.get(si + 1).map_or(sym.end_line, |next| {
            if next.line_idx > sym.end_line {
                next.line_idx
            } else {
                sym.end_line
            }
        });
        let content_end = if si + 1 == symbols.len() {
            lines.len().min(content_end.max(sym.end_line))
        } else {
            content_end
        };
        sections.push(ParsedSection {
            parent: None,
            order_index,
            kind: SectionKind::Symbol,
            title: sym.name.clone(),
            content: lines[sym.line_idx..content_end.min(lines.len())].concat(),
            closing_tag_prefix: String::new(),
            line_start: sym.line_idx + 1,
            line_end: content_end,
        });
        order_index += 1;
    }

    let last_end = sections.last().map_or(0, |s| s.line_end);
    if last_end < lines.len() {
        sections.push(ParsedSection {
            parent: None,
            order_index,
            kind: SectionKind::Footer,
            title: "footer".to_string(),
            content: lines[last_end..].concat(),
            closing_tag_prefix: String::new(),
            line_start: last_end + 1,
            line_end: lines.len(),
        });
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_symbols_yields_single_module_section() {
        let sections = parse(FileFormat::ScriptPython, "x = 1\ny = 2\n");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].kind, SectionKind::Module);
        assert_eq!(sections[0].title, "module");
        assert_eq!(sections[0].content, "x = 1\ny = 2\n");
    }

    #[test]
    fn python_gap_preservation() {
        let input = "\"\"\"m\"\"\"\n\ndef a():\n    return 1\n\n\ndef b():\n    return 2\n";
        let sections = parse(FileFormat::ScriptPython, input);
        let concatenated: String = sections.iter().map(|s| s.content.clone()).collect();
        assert_eq!(concatenated, input);
        assert_eq!(sections[0].title, "module");
        assert_eq!(sections[0].content, "\"\"\"m\"\"\"\n\n");
        assert_eq!(sections[1].title, "a");
        assert_eq!(sections[1].content, "def a():\n    return 1\n\n\n");
        assert_eq!(sections[2].title, "b");
        assert_eq!(sections[2].content, "def b():\n    return 2\n");
    }

    #[test]
    fn js_function_brace_depth() {
        let input = "function a() {\n  if (true) {\n    return 1;\n  }\n}\nfunction b() {\n  return 2;\n}\n";
        let sections = parse(FileFormat::ScriptJs, input);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "a");
        assert_eq!(sections[1].title, "b");
        let concatenated: String = sections.iter().map(|s| s.content.clone()).collect();
        assert_eq!(concatenated, input);
    }

    #[test]
    fn footer_after_last_symbol_preserved() {
        let input = "def a():\n    return 1\n# trailing comment\n";
        let sections = parse(FileFormat::ScriptPython, input);
        assert_eq!(sections.last().unwrap().kind, SectionKind::Footer);
        assert_eq!(sections.last().unwrap().content, "# trailing comment\n");
    }
}

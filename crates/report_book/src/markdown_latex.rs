use crate::{latex_escape, section_label};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Bullet,
    Numbered,
}

impl ListKind {
    fn env(self) -> &'static str {
        match self {
            ListKind::Bullet => "itemize",
            ListKind::Numbered => "enumerate",
        }
    }
}

#[derive(Debug)]
enum Block<'a> {
    Code(Vec<&'a str>),
    Quote(Vec<&'a str>),
    Table {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Heading {
        level: usize,
        text: &'a str,
    },
    Item {
        indent: usize,
        kind: ListKind,
        text: String,
    },
    Paragraph(&'a str),
    /// Blank line or horizontal rule; ends any open list.
    Break,
}

/// Converts the Markdown subset used by generated chapters and authored
/// static sections into LaTeX body text.
pub fn md_to_latex(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut writer = LatexWriter::default();
    for block in parse_blocks(&lines) {
        writer.block(&block);
    }
    writer.finish()
}

fn parse_blocks<'a>(lines: &[&'a str]) -> Vec<Block<'a>> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if line.trim_start().starts_with("```") {
            let body: Vec<&str> = lines[i + 1..]
                .iter()
                .take_while(|l| !l.trim_start().starts_with("```"))
                .copied()
                .collect();
            i += body.len() + 2;
            blocks.push(Block::Code(body));
        } else if line.starts_with('>') {
            let quoted: Vec<&str> = lines[i..]
                .iter()
                .take_while(|l| l.starts_with('>'))
                .map(|l| {
                    let content = &l[1..];
                    content.strip_prefix(' ').unwrap_or(content)
                })
                .collect();
            i += quoted.len();
            blocks.push(Block::Quote(quoted));
        } else if trimmed.is_empty() || matches!(trimmed, "---" | "***" | "___") {
            blocks.push(Block::Break);
            i += 1;
        } else if let Some(header) = table_header(line, lines.get(i + 1).copied()) {
            let rows: Vec<Vec<String>> = lines[i + 2..]
                .iter()
                .map_while(|l| split_row(l))
                .collect();
            i += 2 + rows.len();
            blocks.push(Block::Table { header, rows });
        } else if line.starts_with('#') {
            let level = line.len() - line.trim_start_matches('#').len();
            blocks.push(Block::Heading {
                level,
                text: line[level..].trim(),
            });
            i += 1;
        } else if let Some((indent, kind, first)) = list_item(line) {
            let mut text = first.to_string();
            i += 1;
            while let Some(next) = lines.get(i).filter(|l| continues_item(l)) {
                text.push(' ');
                text.push_str(next.trim());
                i += 1;
            }
            blocks.push(Block::Item { indent, kind, text });
        } else {
            blocks.push(Block::Paragraph(line));
            i += 1;
        }
    }
    blocks
}

fn list_item(line: &str) -> Option<(usize, ListKind, &str)> {
    let trimmed = line.trim_start();
    let indent = line.len() - trimmed.len();
    if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        return Some((indent, ListKind::Bullet, rest));
    }
    let after_digits = trimmed.trim_start_matches(|c: char| c.is_ascii_digit());
    if after_digits.len() == trimmed.len() {
        return None;
    }
    after_digits
        .strip_prefix(". ")
        .map(|rest| (indent, ListKind::Numbered, rest))
}

/// A non-blank line that does not start a block of its own.
fn continues_item(line: &str) -> bool {
    !line.trim().is_empty()
        && list_item(line).is_none()
        && !line.starts_with('#')
        && !line.starts_with("```")
        && !line.starts_with('>')
}

fn table_header(line: &str, next: Option<&str>) -> Option<Vec<String>> {
    let header = split_row(line)?;
    let separator = split_row(next?)?;
    let is_separator = separator
        .iter()
        .all(|cell| !cell.is_empty() && cell.chars().all(|c| matches!(c, '-' | ':' | ' ')));
    (header.len() >= 2 && is_separator).then_some(header)
}

/// Splits a `| a | b |` row. `\|` inside a cell is a literal pipe; other
/// backslash escapes are left for the inline pass.
fn split_row(line: &str) -> Option<Vec<String>> {
    let inner = line.trim().strip_prefix('|')?.strip_suffix('|')?;
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('|') => current.push('|'),
                Some(next) => {
                    current.push('\\');
                    current.push(next);
                }
                None => current.push('\\'),
            },
            '|' => cells.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    cells.push(current.trim().to_string());
    Some(cells)
}

#[derive(Default)]
struct LatexWriter {
    out: String,
    /// Open list environments, innermost last.
    lists: Vec<(usize, ListKind)>,
}

impl LatexWriter {
    fn block(&mut self, block: &Block<'_>) {
        if let Block::Item { indent, kind, text } = block {
            self.item(*indent, *kind, text);
            return;
        }
        self.close_lists();
        match block {
            Block::Code(lines) => {
                self.out.push_str("\\begin{ledgercode}\n");
                for line in lines {
                    self.out.push_str(line);
                    self.out.push('\n');
                }
                self.out.push_str("\\end{ledgercode}\n\n");
            }
            Block::Quote(lines) => {
                self.out.push_str("\\begin{quote}\n");
                self.out.push_str(&md_to_latex(&lines.join("\n")));
                self.out.push_str("\\end{quote}\n\n");
            }
            Block::Table { header, rows } => self.table(header, rows),
            Block::Heading { level, text } => {
                let command = if *level >= 3 { "subsection*" } else { "section*" };
                self.out
                    .push_str(&format!("\\{}{{{}}}\n", command, render_inline(text)));
            }
            Block::Paragraph(line) => {
                self.out.push_str(&render_inline(line));
                self.out.push('\n');
            }
            Block::Break => self.out.push('\n'),
            Block::Item { .. } => {}
        }
    }

    fn item(&mut self, indent: usize, kind: ListKind, text: &str) {
        while let Some(&(open_indent, open_kind)) = self.lists.last() {
            if open_indent < indent || (open_indent == indent && open_kind == kind) {
                break;
            }
            self.out.push_str(&format!("\\end{{{}}}\n", open_kind.env()));
            self.lists.pop();
        }
        if self.lists.last().map_or(true, |&(open_indent, _)| open_indent < indent) {
            self.out.push_str(&format!("\\begin{{{}}}\n", kind.env()));
            self.lists.push((indent, kind));
        }
        self.out.push_str(&format!("\\item {}\n", render_inline(text)));
    }

    fn table(&mut self, header: &[String], rows: &[Vec<String>]) {
        let cols = header.len();
        let width = 0.95 / cols as f64;
        let spec: String = (0..cols)
            .map(|_| format!("|p{{{width:.3}\\linewidth}}"))
            .collect();
        self.out
            .push_str(&format!("\\begin{{longtable}}{{{spec}|}}\n\\hline\n"));
        let head: Vec<String> = header
            .iter()
            .map(|cell| format!("\\textbf{{{}}}", render_inline(cell)))
            .collect();
        self.out.push_str(&head.join(" & "));
        self.out.push_str(" \\\\\n\\hline\n\\endhead\n");
        for row in rows {
            let mut cells: Vec<String> = row.iter().take(cols).map(|c| render_inline(c)).collect();
            cells.resize(cols, "-".to_string());
            self.out.push_str(&cells.join(" & "));
            self.out.push_str(" \\\\\n\\hline\n");
        }
        self.out.push_str("\\end{longtable}\n\n");
    }

    fn close_lists(&mut self) {
        while let Some((_, kind)) = self.lists.pop() {
            self.out.push_str(&format!("\\end{{{}}}\n", kind.env()));
        }
    }

    fn finish(mut self) -> String {
        self.close_lists();
        self.out
    }
}

fn is_markdown_escapable(c: char) -> bool {
    matches!(c, '\\' | '`' | '*' | '_' | '[' | ']' | '|')
}

fn render_inline(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(first) = rest.chars().next() {
        if first == '\\' {
            if let Some(escaped) = rest[1..].chars().next().filter(|c| is_markdown_escapable(*c)) {
                let end = 1 + escaped.len_utf8();
                out.push_str(&latex_escape(&rest[1..end]));
                rest = &rest[end..];
                continue;
            }
        }
        if let Some(after) = rest.strip_prefix('`') {
            if let Some(end) = after.find('`') {
                out.push_str(&format!("\\texttt{{{}}}", latex_escape(&after[..end])));
                rest = &after[end + 1..];
                continue;
            }
        }
        if let Some(after) = rest.strip_prefix("**") {
            if let Some(end) = find_closing(after, "**") {
                out.push_str(&format!("\\textbf{{{}}}", render_inline(&after[..end])));
                rest = &after[end + 2..];
                continue;
            }
        } else if let Some(after) = rest.strip_prefix('*') {
            if let Some(end) = find_closing(after, "*") {
                out.push_str(&format!("\\textit{{{}}}", render_inline(&after[..end])));
                rest = &after[end + 1..];
                continue;
            }
        }
        if let Some((text, href, tail)) = split_link(rest) {
            out.push_str(&render_link(text, href));
            rest = tail;
            continue;
        }

        let skip = first.len_utf8();
        let run = rest[skip..]
            .find(['\\', '`', '*', '['])
            .map_or(rest.len(), |i| i + skip);
        out.push_str(&latex_escape(&rest[..run]));
        rest = &rest[run..];
    }
    out
}

/// Position of `delim` in `s`, skipping escaped characters and code spans.
fn find_closing(s: &str, delim: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '`' => {
                if let Some(end) = s[i + 1..].find('`') {
                    let close = i + 1 + end;
                    for (j, _) in chars.by_ref() {
                        if j >= close {
                            break;
                        }
                    }
                }
            }
            _ if s[i..].starts_with(delim) => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_link(s: &str) -> Option<(&str, &str, &str)> {
    let (text, after) = s.strip_prefix('[')?.split_once(']')?;
    let (href, tail) = after.strip_prefix('(')?.split_once(')')?;
    Some((text, href, tail))
}

/// Contents links become `\hyperref`, web links `\href`; anything else
/// keeps only its text.
fn render_link(text: &str, href: &str) -> String {
    let label = latex_escape(text);
    if let Some(key) = href.strip_prefix("#sec-") {
        format!("\\hyperref[{}]{{{}}}", section_label(key), label)
    } else if href.starts_with("http://") || href.starts_with("https://") {
        let target = href.replace('%', "\\%").replace('#', "\\#");
        format!("\\href{{{}}}{{{}}}", target, label)
    } else {
        label
    }
}

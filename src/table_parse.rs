use crate::model::Cell;

/// Splits a text line on tabs and runs of two or more spaces.
pub(crate) fn split_line_into_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut whitespace_run = 0_usize;

    for ch in trimmed.chars() {
        if ch == '\t' {
            if !current.trim().is_empty() {
                cells.push(current.trim().to_string());
                current.clear();
            }
            whitespace_run = 0;
            continue;
        }

        if ch.is_whitespace() {
            whitespace_run += 1;
            if whitespace_run >= 2 {
                if !current.trim().is_empty() {
                    cells.push(current.trim().to_string());
                    current.clear();
                }
                continue;
            }
            current.push(' ');
            continue;
        }

        whitespace_run = 0;
        current.push(ch);
    }

    if !current.trim().is_empty() {
        cells.push(current.trim().to_string());
    }

    cells
}

pub(crate) fn soft_split_line_into_cells(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Turns a block of recognized text into ragged rows, one per non-blank line,
/// one column per whitespace-separated token.
pub(crate) fn tokenize_text_block(text: &str) -> Vec<Vec<Cell>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            soft_split_line_into_cells(line)
                .into_iter()
                .map(Some)
                .collect()
        })
        .collect()
}

pub(crate) fn pad_row(row: &[Cell], width: usize) -> Vec<Cell> {
    let mut out = row.to_vec();
    out.resize(width, None);
    out
}

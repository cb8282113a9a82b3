//! Checklist parsing for task documents.
//!
//! Recognizes markdown task-list items in both states:
//! `- [ ] pending`, `- [x] done` (also `*`, `+` and `1.` bullets, `[X]`).

/// State of a single criterion line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionState {
    Pending,
    Done,
}

/// Classify one line of a task document.
///
/// Returns `None` for anything that is not a checklist item.
pub fn parse_criterion(line: &str) -> Option<CriterionState> {
    let trimmed = line.trim_start();
    let rest = strip_bullet(trimmed)?;

    // At least one space between the bullet and the box
    let boxed = rest.strip_prefix(' ')?.trim_start();
    let mut chars = boxed.chars();
    if chars.next()? != '[' {
        return None;
    }
    let mark = chars.next()?;
    if chars.next()? != ']' {
        return None;
    }

    // The box must stand alone: followed by whitespace or end of line
    match chars.next() {
        None => {}
        Some(c) if c.is_whitespace() => {}
        Some(_) => return None,
    }

    match mark {
        ' ' => Some(CriterionState::Pending),
        'x' | 'X' => Some(CriterionState::Done),
        _ => None,
    }
}

fn strip_bullet(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix(['-', '*', '+']) {
        return Some(rest);
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix(['.', ')'])
}

/// Count `(done, total)` criteria in a task document.
pub fn parse_completion(content: &str) -> (usize, usize) {
    content
        .lines()
        .filter_map(parse_criterion)
        .fold((0, 0), |(done, total), state| match state {
            CriterionState::Done => (done + 1, total + 1),
            CriterionState::Pending => (done, total + 1),
        })
}

/// A document with no recognized criteria is never complete.
pub fn is_complete(done: usize, total: usize) -> bool {
    total > 0 && done == total
}

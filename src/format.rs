//! Text rendering for query results.
//!
//! This is the only place that knows how a user reference is written as a
//! mention, or how a table is laid out.

use crate::store::{ChatTarget, Member, MemberStats, Task, UserRef};

/// Mention token for a user.
pub fn mention(user: &UserRef) -> String {
    match user {
        UserRef::Id(id) => format!("tg://user?id={}", id),
        UserRef::Username(name) => format!("@{}", name),
    }
}

/// Mention as Telegram HTML. Id references become a `tg://user` link,
/// which only renders outside `<pre>` blocks.
pub fn mention_html(user: &UserRef) -> String {
    match user {
        UserRef::Id(id) => format!("<a href=\"{}\">user {}</a>", mention(user), id),
        UserRef::Username(_) => mention(user),
    }
}

/// Display form of a chat destination.
pub fn channel(target: &ChatTarget) -> String {
    target.to_string()
}

/// Render rows under `headers` as a boxed, left-aligned text table.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let rule = {
        let mut line = String::from("+");
        for w in &widths {
            line.push_str(&"-".repeat(w + 2));
            line.push('+');
        }
        line
    };

    let mut out = Vec::with_capacity(rows.len() + 4);
    out.push(rule.clone());
    out.push(render_row(&widths, headers.iter().copied()));
    out.push(rule.clone());
    for row in rows {
        out.push(render_row(&widths, row.iter().map(String::as_str)));
    }
    out.push(rule);
    out.join("\n")
}

fn render_row<'a>(widths: &[usize], mut cells: impl Iterator<Item = &'a str>) -> String {
    let mut line = String::from("|");
    for w in widths {
        let cell = cells.next().unwrap_or("");
        let pad = w - cell.chars().count();
        line.push(' ');
        line.push_str(cell);
        line.push_str(&" ".repeat(pad + 1));
        line.push('|');
    }
    line
}

pub fn members_table(members: &[Member]) -> String {
    let rows: Vec<Vec<String>> = members
        .iter()
        .map(|m| {
            vec![
                m.id.to_string(),
                m.name.clone(),
                m.paid.to_string(),
                m.comment.clone().unwrap_or_default(),
            ]
        })
        .collect();
    render_table(&["ID", "Name", "Paid", "Comment"], &rows)
}

pub fn unpaid_table(members: &[Member]) -> String {
    let rows: Vec<Vec<String>> = members
        .iter()
        .map(|m| vec![m.id.to_string(), m.name.clone(), m.comment.clone().unwrap_or_default()])
        .collect();
    render_table(&["ID", "Name", "Comment"], &rows)
}

pub fn tasks_table(tasks: &[Task]) -> String {
    let rows: Vec<Vec<String>> = tasks
        .iter()
        .map(|t| vec![t.id.to_string(), t.description.clone(), mention(&t.assignee)])
        .collect();
    render_table(&["ID", "Description", "Assignee"], &rows)
}

pub fn stats(stats: &MemberStats) -> String {
    format!(
        "Total: {}\nPaid: {}\nUnpaid: {}",
        stats.total,
        stats.paid,
        stats.unpaid()
    )
}

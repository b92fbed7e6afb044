use beamforge::core_types::{Sentence, Vocabulary};
use beamforge::coverage::Span;
use beamforge::options::{FutureCostMatrix, TranslationOptionTable};
use beamforge::search::{Derivation, SearchStats};
use comfy_table::presets::ASCII_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn align_right(table: &mut Table, columns: std::ops::Range<usize>) {
    for i in columns {
        if let Some(col) = table.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }
}

/// One row per derivation, one column per feature (weighted contribution).
pub fn n_best_table(derivations: &[Derivation]) -> Table {
    let mut table = new_table();
    let Some(first) = derivations.first() else {
        return table;
    };

    let mut header = vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Output").add_attribute(Attribute::Bold),
        Cell::new("Total").fg(Color::Cyan),
    ];
    header.extend(first.breakdown.iter().map(|s| Cell::new(&s.name)));
    table.set_header(header);

    for (rank, d) in derivations.iter().enumerate() {
        let mut row = vec![
            Cell::new(rank + 1),
            Cell::new(&d.output),
            Cell::new(format!("{:.4}", d.total_score)).fg(Color::Cyan),
        ];
        row.extend(
            d.breakdown
                .iter()
                .map(|s| Cell::new(format!("{:.3}", s.weighted))),
        );
        table.add_row(row);
    }
    align_right(&mut table, 2..first.breakdown.len() + 3);
    table
}

pub fn stats_table(stats: &SearchStats) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Counter").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
    ]);

    let rows: [(&str, String); 13] = [
        ("words", stats.sentence_len.to_string()),
        ("options", stats.options.to_string()),
        ("created", stats.created.to_string()),
        ("added", stats.added.to_string()),
        ("rejected", stats.rejected.to_string()),
        ("recombined", stats.recombined.to_string()),
        ("pruned", stats.pruned.to_string()),
        ("not completable", stats.not_completable.to_string()),
        ("early discarded", stats.early_discarded.to_string()),
        ("invariant violations", stats.invariant_violations.to_string()),
        ("stacks expanded", stats.stacks_expanded.to_string()),
        ("interrupted", stats.interrupted.to_string()),
        ("elapsed ms", stats.elapsed_ms.to_string()),
    ];
    for (name, value) in rows {
        let mut value_cell = Cell::new(value);
        if name == "invariant violations" && stats.invariant_violations > 0 {
            value_cell = value_cell.fg(Color::Red);
        }
        table.add_row(vec![Cell::new(name), value_cell]);
    }
    align_right(&mut table, 1..2);
    table
}

pub fn options_table(options: &TranslationOptionTable, vocab: &Vocabulary) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Span").add_attribute(Attribute::Bold),
        Cell::new("Target").add_attribute(Attribute::Bold),
        Cell::new("Estimate").fg(Color::Cyan),
        Cell::new("Scores"),
    ]);

    for (span, opts) in options.iter() {
        for opt in opts {
            let mut target = Cell::new(opt.target().render_factored(vocab));
            if opt.is_unknown() {
                target = target.fg(Color::Yellow);
            }
            let scores = opt
                .partial_scores()
                .as_slice()
                .iter()
                .map(|s| format!("{:.2}", s))
                .collect::<Vec<_>>()
                .join(" ");
            table.add_row(vec![
                Cell::new(span),
                target,
                Cell::new(format!("{:.4}", opt.estimated_score())).fg(Color::Cyan),
                Cell::new(scores),
            ]);
        }
    }
    align_right(&mut table, 2..3);
    table
}

/// Upper triangle of the future-cost matrix; rows are start positions.
pub fn future_cost_table(
    future: &FutureCostMatrix,
    sentence: &Sentence,
    vocab: &Vocabulary,
) -> Table {
    let mut table = new_table();
    let n = future.size();

    let mut header = vec![Cell::new("start \\ end").add_attribute(Attribute::Bold)];
    header.extend(
        sentence
            .words()
            .iter()
            .enumerate()
            .map(|(i, w)| Cell::new(format!("{} {}", i, vocab.render_word(w)))),
    );
    table.set_header(header);

    for start in 0..n {
        let mut row = vec![Cell::new(start).add_attribute(Attribute::Bold)];
        for end in 0..n {
            let cell = if end < start {
                Cell::new("")
            } else {
                let cost = future.get(Span::new(start, end));
                if cost == f32::NEG_INFINITY {
                    Cell::new("-inf").fg(Color::Red)
                } else {
                    Cell::new(format!("{:.3}", cost))
                }
            };
            row.push(cell);
        }
        table.add_row(row);
    }
    align_right(&mut table, 1..n + 1);
    table
}

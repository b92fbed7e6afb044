use crate::core_types::{Vocabulary, MAX_FACTORS, SURFACE_FACTOR};
use crate::error::{DecResult, DecoderError};
use crate::features::{
    BackoffLm, GenerationTable, MemoryGenerationTable, MemoryPhraseTable, PhraseTable,
};
use crate::scoring::{floor_score, log10_to_ln, transform_prob};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// `PATH[:INPUT_FACTORS[:OUTPUT_FACTORS]]`, factor lists comma separated.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub path: PathBuf,
    pub input_factors: Vec<usize>,
    pub output_factors: Vec<usize>,
}

impl FromStr for TableSpec {
    type Err = DecoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let path = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| DecoderError::Config(format!("empty table path in '{}'", s)))?;
        let input_factors = match parts.next() {
            Some(list) => parse_factor_list(list)?,
            None => vec![SURFACE_FACTOR],
        };
        let output_factors = match parts.next() {
            Some(list) => parse_factor_list(list)?,
            None => vec![SURFACE_FACTOR],
        };
        if parts.next().is_some() {
            return Err(DecoderError::Config(format!(
                "too many ':' fields in table spec '{}'",
                s
            )));
        }
        Ok(Self {
            path: PathBuf::from(path),
            input_factors,
            output_factors,
        })
    }
}

fn parse_factor_list(list: &str) -> DecResult<Vec<usize>> {
    list.split(',')
        .map(|f| {
            f.trim()
                .parse::<usize>()
                .ok()
                .filter(|&idx| idx < MAX_FACTORS)
                .ok_or_else(|| DecoderError::Config(format!("invalid factor index '{}'", f)))
        })
        .collect()
}

fn tsv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quoting(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(reader)
}

fn parse_scores(field: &str) -> Option<Vec<f32>> {
    field
        .split_whitespace()
        .map(|p| p.parse::<f32>().ok())
        .collect()
}

fn open(path: &Path) -> DecResult<File> {
    File::open(path).map_err(|e| {
        DecoderError::Io(std::io::Error::new(
            e.kind(),
            format!("could not open '{}': {}", path.display(), e),
        ))
    })
}

fn table_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "table".to_string())
}

pub fn load_phrase_table(spec: &TableSpec, vocab: &Vocabulary) -> DecResult<MemoryPhraseTable> {
    info!("Loading phrase table: {}", spec.path.display());
    let file = open(&spec.path)?;
    read_phrase_table(file, &table_name(&spec.path), spec, vocab)
}

/// `source<TAB>target<TAB>probabilities`. The score count is fixed by the
/// first usable row; rows disagreeing with it are skipped.
pub fn read_phrase_table<R: Read>(
    reader: R,
    name: &str,
    spec: &TableSpec,
    vocab: &Vocabulary,
) -> DecResult<MemoryPhraseTable> {
    let mut rdr = tsv_reader(reader);
    let mut table: Option<MemoryPhraseTable> = None;
    let mut skipped = 0;

    for (row_idx, result) in rdr.records().enumerate() {
        let rec = result?;
        if rec.len() < 3 {
            skipped += 1;
            continue;
        }
        let source: Vec<_> = rec[0]
            .split_whitespace()
            .map(|t| vocab.intern_word_into(t, &spec.input_factors))
            .collect();
        let target = rec[1]
            .split_whitespace()
            .map(|t| vocab.intern_word_into(t, &spec.output_factors))
            .collect::<Vec<_>>();
        let Some(probs) = parse_scores(&rec[2]) else {
            debug!("[Row {}] unparsable scores '{}'", row_idx + 1, &rec[2]);
            skipped += 1;
            continue;
        };
        if source.is_empty() || probs.is_empty() {
            skipped += 1;
            continue;
        }

        let table = table.get_or_insert_with(|| {
            MemoryPhraseTable::factored(
                name,
                probs.len(),
                spec.input_factors.clone(),
                spec.output_factors.clone(),
            )
        });
        if probs.len() != table.num_scores() {
            skipped += 1;
            continue;
        }
        let scores: Vec<f32> = probs.iter().map(|p| transform_prob(*p)).collect();
        table.insert(&source, target.into(), &scores);
    }

    if skipped > 0 {
        warn!("{}: skipped {} malformed rows", name, skipped);
    }
    table.ok_or_else(|| DecoderError::Validation(format!("phrase table '{}' has no usable rows", name)))
}

pub fn load_generation_table(
    spec: &TableSpec,
    vocab: &Vocabulary,
) -> DecResult<MemoryGenerationTable> {
    info!("Loading generation table: {}", spec.path.display());
    let file = open(&spec.path)?;
    read_generation_table(file, &table_name(&spec.path), spec, vocab)
}

/// `input word<TAB>output word<TAB>probabilities`.
pub fn read_generation_table<R: Read>(
    reader: R,
    name: &str,
    spec: &TableSpec,
    vocab: &Vocabulary,
) -> DecResult<MemoryGenerationTable> {
    let mut rdr = tsv_reader(reader);
    let mut table: Option<MemoryGenerationTable> = None;
    let mut skipped = 0;

    for result in rdr.records() {
        let rec = result?;
        if rec.len() < 3 {
            skipped += 1;
            continue;
        }
        let (input, output) = (rec[0].trim(), rec[1].trim());
        let probs = match parse_scores(&rec[2]) {
            Some(p) if !p.is_empty() && !input.is_empty() && !output.is_empty() => p,
            _ => {
                skipped += 1;
                continue;
            }
        };
        let table = table.get_or_insert_with(|| {
            MemoryGenerationTable::new(
                name,
                probs.len(),
                spec.input_factors.clone(),
                spec.output_factors.clone(),
            )
        });
        if probs.len() != table.num_scores() {
            skipped += 1;
            continue;
        }
        let scores: Vec<f32> = probs.iter().map(|p| transform_prob(*p)).collect();
        table.insert(
            &vocab.intern_word_into(input, &spec.input_factors),
            &vocab.intern_word_into(output, &spec.output_factors),
            &scores,
        );
    }

    if skipped > 0 {
        warn!("{}: skipped {} malformed rows", name, skipped);
    }
    table.ok_or_else(|| {
        DecoderError::Validation(format!("generation table '{}' has no usable rows", name))
    })
}

/// `PATH[:FACTOR]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LmSpec {
    pub path: PathBuf,
    pub factor: usize,
}

impl FromStr for LmSpec {
    type Err = DecoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, factor) = match s.rsplit_once(':') {
            Some((p, f)) => (p, parse_factor_list(f)?),
            None => (s, vec![SURFACE_FACTOR]),
        };
        match factor.as_slice() {
            [f] if !path.is_empty() => Ok(Self {
                path: PathBuf::from(path),
                factor: *f,
            }),
            _ => Err(DecoderError::Config(format!("invalid language model spec '{}'", s))),
        }
    }
}

pub fn load_lm(spec: &LmSpec, vocab: &Vocabulary) -> DecResult<BackoffLm> {
    info!("Loading language model: {}", spec.path.display());
    let file = open(&spec.path)?;
    read_lm(file, spec.factor, vocab)
}

/// `ngram<TAB>log10 prob[<TAB>log10 backoff]`. The order is the longest
/// n-gram seen.
pub fn read_lm<R: Read>(reader: R, factor: usize, vocab: &Vocabulary) -> DecResult<BackoffLm> {
    let mut rdr = tsv_reader(reader);
    let mut rows = Vec::new();
    let mut skipped = 0;

    for result in rdr.records() {
        let rec = result?;
        if rec.len() < 2 {
            skipped += 1;
            continue;
        }
        let ngram: Vec<_> = rec[0].split_whitespace().map(|t| vocab.intern(t)).collect();
        let prob: f32 = match rec[1].trim().parse() {
            Ok(p) => p,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        let backoff: f32 = rec.get(2).and_then(|b| b.trim().parse().ok()).unwrap_or(0.0);
        if ngram.is_empty() {
            skipped += 1;
            continue;
        }
        rows.push((ngram, prob, backoff));
    }

    let order = rows.iter().map(|(ngram, _, _)| ngram.len()).max().ok_or_else(|| {
        DecoderError::Validation("language model has no usable rows".to_string())
    })?;
    if skipped > 0 {
        warn!("language model: skipped {} malformed rows", skipped);
    }

    let mut lm = BackoffLm::new(order).with_factor(factor);
    for (ngram, prob, backoff) in rows {
        lm.insert(ngram, floor_score(log10_to_ln(prob)), floor_score(log10_to_ln(backoff)));
    }
    debug!("Language model: order {}, {} n-grams", order, lm.len());
    Ok(lm)
}

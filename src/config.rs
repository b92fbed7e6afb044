use crate::error::{DecResult, DecoderError};
use clap::{parser::ValueSource, ArgMatches, Args};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Args, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[command(flatten)]
    pub search: SearchParams,
    #[command(flatten)]
    pub options: OptionParams,
    #[command(flatten)]
    pub weights: FeatureWeights,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Histogram pruning target per stack.
    #[arg(long, default_value_t = 100)]
    pub stack_size: usize,
    /// Beam margin in log space relative to the best hypothesis of a stack.
    #[arg(long, default_value_t = -11.5129, allow_negative_numbers = true)]
    pub beam_threshold: f32,
    /// Maximum jump between consecutive source spans; negative is unconstrained.
    #[arg(long, default_value_t = 6, allow_negative_numbers = true)]
    pub distortion_limit: i32,
    #[arg(long, default_value_t = 0)]
    pub n_best_size: usize,
    #[arg(long, default_value_t = false)]
    pub distinct_n_best: bool,
    #[arg(long, default_value_t = 20)]
    pub n_best_factor: usize,
    /// Cap on hypotheses sharing the same output string within a stack (0 = off).
    #[arg(long, default_value_t = 0)]
    pub max_per_output: usize,
    /// Skip building extensions expected to score below the destination
    /// stack's worst bound plus this margin (unset = off).
    #[arg(long, allow_negative_numbers = true)]
    pub early_discarding: Option<f32>,
    #[arg(long, default_value_t = 1)]
    pub threads: usize,
    /// Wall-clock budget per sentence in milliseconds (0 = none).
    #[arg(long, default_value_t = 0)]
    pub max_time_ms: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            stack_size: 100,
            beam_threshold: -11.5129,
            distortion_limit: 6,
            n_best_size: 0,
            distinct_n_best: false,
            n_best_factor: 20,
            max_per_output: 0,
            early_discarding: None,
            threads: 1,
            max_time_ms: 0,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionParams {
    #[arg(long, default_value_t = 7)]
    pub max_phrase_length: usize,
    /// Translation options kept per span (0 = unlimited).
    #[arg(long, default_value_t = 20)]
    pub max_options_per_span: usize,
    /// Log margin below the best option of a span (0 = off).
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub option_threshold: f32,
    #[arg(long, default_value_t = false)]
    pub drop_unknown: bool,
}

impl Default for OptionParams {
    fn default() -> Self {
        Self {
            max_phrase_length: 7,
            max_options_per_span: 20,
            option_threshold: 0.0,
            drop_unknown: false,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureWeights {
    // === BASELINE PRODUCERS ===
    #[arg(long, default_value_t = 1.0)]
    pub weight_d: f32,
    #[arg(long, default_value_t = 1.0)]
    pub weight_w: f32,
    #[arg(long, default_value_t = 1.0)]
    pub weight_u: f32,

    // === PER-MODEL LISTS ===
    // One entry per language model
    #[arg(long, default_value = "1.0")]
    pub weight_l: String,
    // Phrase-table components, consumed table by table
    #[arg(long, default_value = "1.0")]
    pub weight_t: String,
    // Generation-table components, consumed table by table
    #[arg(long, default_value = "")]
    pub weight_g: String,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            weight_d: 1.0,
            weight_w: 1.0,
            weight_u: 1.0,
            weight_l: "1.0".to_string(),
            weight_t: "1.0".to_string(),
            weight_g: String::new(),
        }
    }
}

impl FeatureWeights {
    pub fn lm_weights(&self) -> DecResult<Vec<f32>> {
        parse_f32_list(&self.weight_l, "weight_l")
    }

    pub fn translation_weights(&self) -> DecResult<Vec<f32>> {
        parse_f32_list(&self.weight_t, "weight_t")
    }

    pub fn generation_weights(&self) -> DecResult<Vec<f32>> {
        parse_f32_list(&self.weight_g, "weight_g")
    }

    pub fn merge_from_cli(&mut self, cli: &FeatureWeights, matches: &ArgMatches) {
        macro_rules! update_if_present {
            ($field:ident, $arg_name:expr) => {
                if matches.value_source($arg_name) == Some(ValueSource::CommandLine) {
                    self.$field = cli.$field.clone();
                }
            };
        }

        update_if_present!(weight_d, "weight_d");
        update_if_present!(weight_w, "weight_w");
        update_if_present!(weight_u, "weight_u");
        update_if_present!(weight_l, "weight_l");
        update_if_present!(weight_t, "weight_t");
        update_if_present!(weight_g, "weight_g");
    }
}

impl SearchParams {
    pub fn merge_from_cli(&mut self, cli: &SearchParams, matches: &ArgMatches) {
        macro_rules! update_if_present {
            ($field:ident, $arg_name:expr) => {
                if matches.value_source($arg_name) == Some(ValueSource::CommandLine) {
                    self.$field = cli.$field;
                }
            };
        }

        update_if_present!(stack_size, "stack_size");
        update_if_present!(beam_threshold, "beam_threshold");
        update_if_present!(distortion_limit, "distortion_limit");
        update_if_present!(n_best_size, "n_best_size");
        update_if_present!(distinct_n_best, "distinct_n_best");
        update_if_present!(n_best_factor, "n_best_factor");
        update_if_present!(max_per_output, "max_per_output");
        update_if_present!(early_discarding, "early_discarding");
        update_if_present!(threads, "threads");
        update_if_present!(max_time_ms, "max_time_ms");
    }

    #[inline(always)]
    pub fn n_best_enabled(&self) -> bool {
        self.n_best_size > 0
    }

    /// Arcs kept per hypothesis once its stack is sealed.
    pub fn arc_limit(&self) -> usize {
        if self.distinct_n_best {
            self.n_best_size * self.n_best_factor.max(1)
        } else {
            self.n_best_size
        }
    }
}

impl OptionParams {
    pub fn merge_from_cli(&mut self, cli: &OptionParams, matches: &ArgMatches) {
        macro_rules! update_if_present {
            ($field:ident, $arg_name:expr) => {
                if matches.value_source($arg_name) == Some(ValueSource::CommandLine) {
                    self.$field = cli.$field;
                }
            };
        }

        update_if_present!(max_phrase_length, "max_phrase_length");
        update_if_present!(max_options_per_span, "max_options_per_span");
        update_if_present!(option_threshold, "option_threshold");
        update_if_present!(drop_unknown, "drop_unknown");
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> DecResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies every flag the user typed explicitly on top of `self`.
    pub fn merge_from_cli(&mut self, cli: &Config, matches: &ArgMatches) {
        self.search.merge_from_cli(&cli.search, matches);
        self.options.merge_from_cli(&cli.options, matches);
        self.weights.merge_from_cli(&cli.weights, matches);
    }

    pub fn validate(&self) -> DecResult<()> {
        if self.search.beam_threshold > 0.0 || self.search.beam_threshold.is_nan() {
            return Err(DecoderError::Config(format!(
                "beam_threshold must be a non-positive log margin, got {}",
                self.search.beam_threshold
            )));
        }
        if self.options.option_threshold > 0.0 || self.options.option_threshold.is_nan() {
            return Err(DecoderError::Config(format!(
                "option_threshold must be a non-positive log margin, got {}",
                self.options.option_threshold
            )));
        }
        if self.search.early_discarding.is_some_and(f32::is_nan) {
            return Err(DecoderError::Config(
                "early_discarding must be a number".to_string(),
            ));
        }
        if self.options.max_phrase_length == 0 {
            return Err(DecoderError::Config(
                "max_phrase_length must be at least 1".to_string(),
            ));
        }
        self.weights.lm_weights()?;
        self.weights.translation_weights()?;
        self.weights.generation_weights()?;
        Ok(())
    }
}

fn parse_f32_list(s: &str, name: &str) -> DecResult<Vec<f32>> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<f32>().map_err(|_| {
                DecoderError::Config(format!("Invalid number '{}' in --{}", p, name))
            })
        })
        .collect()
}

use crate::config::Config;
use crate::core_types::{Sentence, Vocabulary};
use crate::error::{DecResult, DecoderError};
use crate::features::{CopyUnknown, FeatureSet, Models};
use crate::loader::{self, LmSpec, TableSpec};
use crate::options::TranslationOptionTable;
use crate::search::{Derivation, SearchManager, SearchStats};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of translating one sentence.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub input: String,
    pub output: String,
    pub best: Option<Derivation>,
    pub n_best: Vec<Derivation>,
    pub stats: SearchStats,
}

impl Translation {
    pub fn is_found(&self) -> bool {
        self.best.is_some()
    }

    pub fn total_score(&self) -> Option<f32> {
        self.best.as_ref().map(|b| b.total_score)
    }

    /// The translation, or the untouched input when none was found.
    pub fn output_or_input(&self) -> &str {
        if self.is_found() {
            &self.output
        } else {
            &self.input
        }
    }
}

/// Models and configuration bound together; translates any number of
/// sentences.
pub struct Decoder {
    features: FeatureSet,
    config: Config,
    pool: Option<ThreadPool>,
}

impl Decoder {
    pub fn new(mut models: Models, config: Config) -> DecResult<Self> {
        config.validate()?;
        if config.options.drop_unknown {
            models.unknown = Arc::new(CopyUnknown { drop: true });
        }
        let features = FeatureSet::new(models, &config.weights)?;

        let pool = if config.search.threads > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.search.threads)
                .build()
                .map_err(|e| DecoderError::Config(format!("thread pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        debug!(
            "Decoder ready: {} decode step(s), {} language model(s), {} thread(s)",
            features.steps.len(),
            features.lms.len(),
            config.search.threads.max(1)
        );
        Ok(Self {
            features,
            config,
            pool,
        })
    }

    /// Loads the TSV backends and builds a decoder over them.
    pub fn from_files(
        phrase_tables: &[TableSpec],
        generation_tables: &[TableSpec],
        lms: &[LmSpec],
        config: Config,
    ) -> DecResult<Self> {
        if phrase_tables.is_empty() {
            return Err(DecoderError::Config(
                "at least one --phrase-table is required".to_string(),
            ));
        }
        let vocab = Arc::new(Vocabulary::new());
        let mut models = Models::new(Arc::clone(&vocab));

        for spec in phrase_tables {
            models = models.with_translation(Arc::new(loader::load_phrase_table(spec, &vocab)?));
        }
        for spec in generation_tables {
            models =
                models.with_generation(Arc::new(loader::load_generation_table(spec, &vocab)?));
        }
        for spec in lms {
            models = models.with_lm(Arc::new(loader::load_lm(spec, &vocab)?));
        }
        info!("Vocabulary: {} entries", vocab.len());
        Self::new(models, config)
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.features.vocab
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn option_table(&self, sentence: &Sentence) -> TranslationOptionTable {
        TranslationOptionTable::build(
            &self.features,
            &self.config.options,
            sentence,
            self.pool.as_ref(),
        )
    }

    /// A seeded manager for `sentence`, ready to `decode`.
    pub fn manager(&self, sentence: &Sentence) -> DecResult<SearchManager<'_>> {
        let table = self.option_table(sentence);
        let manager = SearchManager::new(&self.features, &self.config.search, table)?;
        Ok(match &self.pool {
            Some(pool) => manager.with_pool(pool),
            None => manager,
        })
    }

    pub fn translate(&self, text: &str) -> DecResult<Translation> {
        let sentence = Sentence::parse(text, self.vocab());
        self.translate_sentence(&sentence)
    }

    pub fn translate_sentence(&self, sentence: &Sentence) -> DecResult<Translation> {
        info!("Translating sentence of {} words", sentence.len());
        let manager = self.manager(sentence)?;
        self.run(sentence, manager)
    }

    /// Decodes with a prepared manager and renders the outcome.
    pub fn run(
        &self,
        sentence: &Sentence,
        mut manager: SearchManager<'_>,
    ) -> DecResult<Translation> {
        manager.decode()?;

        let best = manager.render_best();
        let search = &self.config.search;
        let n_best = if search.n_best_enabled() {
            manager.n_best(search.n_best_size, search.distinct_n_best)
        } else {
            Vec::new()
        };
        let stats = manager.finish();

        let input = sentence.render(self.vocab());
        if best.is_none() {
            warn!("No translation found for: {}", input);
        }
        Ok(Translation {
            output: best.as_ref().map(|b| b.output.clone()).unwrap_or_default(),
            input,
            best,
            n_best,
            stats,
        })
    }
}

//! Batch generation of QA records.
//!
//! Every record owns an RNG seeded from `(seed, template index, question
//! index)`, so a batch is reproducible no matter how rayon schedules it.

use factqa_grammar::TemplatePair;
use factqa_store::FactStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::SamplerConfig;
use crate::error::SamplerError;
use crate::execute::execute;
use crate::instantiate::instantiate;
use crate::record::QaRecord;

/// Instantiate and execute one record.
pub fn sample_record<R: Rng + ?Sized>(
    pair: &TemplatePair,
    store: &dyn FactStore,
    rng: &mut R,
    config: &SamplerConfig,
    with_traces: bool,
) -> Result<QaRecord, SamplerError> {
    let instantiation = instantiate(pair, store, rng, config.valid_only, config)?;
    let execution = execute(store, &instantiation.query, with_traces)?;
    Ok(QaRecord::new(pair, &instantiation, execution))
}

/// Like [`sample_record`], retrying instantiation failures up to
/// `config.max_attempts` times. `Ok(None)` means every attempt failed.
pub fn sample_with_retries<R: Rng + ?Sized>(
    pair: &TemplatePair,
    store: &dyn FactStore,
    rng: &mut R,
    config: &SamplerConfig,
    with_traces: bool,
) -> Result<Option<QaRecord>, SamplerError> {
    let attempts = config.max_attempts.max(1);
    let mut last_error = None;
    for attempt in 0..attempts {
        match sample_record(pair, store, rng, config, with_traces) {
            Ok(record) => return Ok(Some(record)),
            Err(err) if err.is_retryable() => {
                debug!(attempt, error = %err, "instantiation attempt failed");
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    if let Some(err) = last_error {
        warn!(
            template = %pair.question,
            attempts,
            error = %err,
            "skipping template"
        );
    }
    Ok(None)
}

/// Seed for one record.
pub fn record_seed(seed: u64, template: usize, question: usize) -> u64 {
    let mut z = seed
        ^ (template as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (question as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Draw `config.questions_per_template` records for every template.
///
/// Records come back in (template, question) order. Templates whose attempts
/// all fail are skipped; store and grammar errors abort the batch.
pub fn generate_records(
    store: &dyn FactStore,
    templates: &[TemplatePair],
    config: &SamplerConfig,
    seed: u64,
    with_traces: bool,
) -> Result<Vec<QaRecord>, SamplerError> {
    let jobs: Vec<(usize, usize)> = (0..templates.len())
        .flat_map(|t| (0..config.questions_per_template).map(move |q| (t, q)))
        .collect();

    let records = jobs
        .par_iter()
        .map(|&(t, q)| {
            let mut rng = StdRng::seed_from_u64(record_seed(seed, t, q));
            sample_with_retries(&templates[t], store, &mut rng, config, with_traces)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let records: Vec<QaRecord> = records.into_iter().flatten().collect();
    info!(
        templates = templates.len(),
        requested = jobs.len(),
        produced = records.len(),
        "generated records"
    );
    Ok(records)
}

use std::sync::{Condvar, Mutex};

use crate::error::TokenizerError;

#[cfg(feature = "lindera-impl")]
mod lindera_backend;
#[cfg(feature = "lindera-impl")]
pub use self::lindera_backend::LinderaAnalyzer;

/// One morpheme as reported by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Morpheme {
    /// Byte offsets into the analyzed text.
    pub start: usize,
    pub end: usize,
    /// Reading in katakana, as dictionaries store it.
    pub reading: Option<String>,
    pub base_form: Option<String>,
    pub pos: Option<String>,
}

impl Morpheme {
    /// Build from an IPADIC-style feature row:
    /// `[pos, pos2, pos3, pos4, conj_type, conj_form, base_form, reading, pronunciation]`.
    /// `*` marks an empty column; unknown words carry a single `UNK` column.
    pub fn from_ipadic(start: usize, end: usize, details: &[String]) -> Self {
        let col = |i: usize| details.get(i).filter(|v| !v.is_empty() && v.as_str() != "*").cloned();
        if details.first().map(String::as_str) == Some("UNK") {
            return Self { start, end, ..Self::default() };
        }
        Self { start, end, pos: col(0), base_form: col(6), reading: col(7) }
    }
}

/// Core interface for morphological analyzers. Instances need not be shareable across
/// threads at once; the pool hands each one to a single caller at a time.
pub trait MorphAnalyzer: Send {
    fn analyze(&mut self, text: &str) -> Result<Vec<Morpheme>, TokenizerError>;
    fn name(&self) -> &'static str;
}

/// Fixed set of analyzer instances with blocking checkout.
pub struct AnalyzerPool {
    idle: Mutex<Vec<Box<dyn MorphAnalyzer>>>,
    available: Condvar,
    size: usize,
}

impl AnalyzerPool {
    pub fn new(analyzers: Vec<Box<dyn MorphAnalyzer>>) -> Result<Self, TokenizerError> {
        if analyzers.is_empty() {
            return Err(TokenizerError::InvalidConfiguration { message: "analyzer pool needs at least one analyzer".into() });
        }
        let size = analyzers.len();
        Ok(Self { idle: Mutex::new(analyzers), available: Condvar::new(), size })
    }

    /// Build `size` analyzers up front.
    pub fn with_factory<F>(size: usize, mut factory: F) -> Result<Self, TokenizerError>
    where
        F: FnMut() -> Result<Box<dyn MorphAnalyzer>, TokenizerError>,
    {
        let analyzers = (0..size).map(|_| factory()).collect::<Result<Vec<_>, _>>()?;
        Self::new(analyzers)
    }

    pub fn size(&self) -> usize { self.size }

    pub fn idle_count(&self) -> usize {
        match self.idle.lock() { Ok(idle) => idle.len(), Err(poisoned) => poisoned.into_inner().len() }
    }

    /// Wait for a free analyzer. It goes back to the pool when the guard drops.
    pub fn checkout(&self) -> Result<PooledAnalyzer<'_>, TokenizerError> {
        let mut idle = self.idle.lock().map_err(|_| poisoned())?;
        loop {
            if let Some(analyzer) = idle.pop() {
                return Ok(PooledAnalyzer { pool: self, inner: Some(analyzer) });
            }
            idle = self.available.wait(idle).map_err(|_| poisoned())?;
        }
    }

    fn checkin(&self, analyzer: Box<dyn MorphAnalyzer>) {
        let mut idle = match self.idle.lock() { Ok(g) => g, Err(poisoned) => poisoned.into_inner() };
        idle.push(analyzer);
        self.available.notify_one();
    }
}

fn poisoned() -> TokenizerError {
    TokenizerError::Analyzer { message: "analyzer pool lock poisoned".into() }
}

/// Exclusive use of one pooled analyzer.
pub struct PooledAnalyzer<'a> {
    pool: &'a AnalyzerPool,
    inner: Option<Box<dyn MorphAnalyzer>>,
}

impl PooledAnalyzer<'_> {
    pub fn analyze(&mut self, text: &str) -> Result<Vec<Morpheme>, TokenizerError> {
        match self.inner.as_mut() {
            Some(analyzer) => analyzer.analyze(text),
            None => Err(TokenizerError::Analyzer { message: "analyzer already returned to pool".into() }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.as_ref().map(|a| a.name()).unwrap_or("returned")
    }
}

impl Drop for PooledAnalyzer<'_> {
    fn drop(&mut self) {
        if let Some(analyzer) = self.inner.take() {
            self.pool.checkin(analyzer);
        }
    }
}

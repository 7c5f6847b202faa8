use crate::engine::replay::SymbolRuntime;
use crate::models::phase::Phase;
use dashmap::DashMap;

/// Per-instrument runtimes keyed by symbol.
///
/// Each entry is locked only for the duration of a closure; callers fetch
/// bars first and never hold an entry across an await.
#[derive(Debug, Default)]
pub struct RuntimeRegistry {
    runtimes: DashMap<String, SymbolRuntime>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.runtimes.contains_key(symbol)
    }

    /// Replaces any existing runtime for the same symbol.
    pub fn insert(&self, runtime: SymbolRuntime) {
        self.runtimes.insert(runtime.symbol().to_string(), runtime);
    }

    pub fn last_seen(&self, symbol: &str) -> Option<i64> {
        self.runtimes.get(symbol).and_then(|rt| rt.last_seen())
    }

    pub fn phase(&self, symbol: &str) -> Option<Phase> {
        self.runtimes.get(symbol).map(|rt| rt.phase())
    }

    /// Run `f` with exclusive access to one symbol's runtime.
    pub fn with_runtime<R>(&self, symbol: &str, f: impl FnOnce(&mut SymbolRuntime) -> R) -> Option<R> {
        let mut entry = self.runtimes.get_mut(symbol)?;
        Some(f(entry.value_mut()))
    }

    /// Snapshot of every symbol's phase, sorted by symbol.
    pub fn phases(&self) -> Vec<(String, Phase)> {
        let mut out: Vec<(String, Phase)> = self
            .runtimes
            .iter()
            .map(|e| (e.key().clone(), e.value().phase()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }
}

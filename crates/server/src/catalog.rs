//! In-memory symbol catalog (spec §5 "Shared resources": "read-heavy;
//! in-memory snapshot refreshed on change notification; writes are rare").

use dashmap::DashMap;
use marketflow_model::Symbol;

/// A read-heavy snapshot of known symbols, keyed by [`Symbol::key`].
/// Writes (catalog changes) are rare and just overwrite the entry; no
/// versioning or change feed is implemented since the catalog-mutation
/// REST surface is out of scope.
#[derive(Debug, Default)]
pub struct SymbolCatalog {
    symbols: DashMap<String, Symbol>,
}

impl SymbolCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, symbol: Symbol) {
        self.symbols.insert(symbol.key(), symbol);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Symbol> {
        self.symbols.get(key).map(|entry| entry.value().clone())
    }

    /// Looks up a symbol by its bare ticker (the form REST/WS paths use,
    /// unqualified by venue) rather than the `venue:ticker` catalog key.
    /// Ambiguous across venues only if two venues list the same ticker,
    /// which the platform's symbol list does not do in practice.
    #[must_use]
    pub fn find_by_symbol(&self, symbol: &str) -> Option<Symbol> {
        self.symbols.iter().find(|entry| entry.value().symbol == symbol).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn all(&self) -> Vec<Symbol> {
        self.symbols.iter().map(|entry| entry.value().clone()).collect()
    }

    /// All active symbols grouped by venue (spec §6 `GET /symbols`).
    #[must_use]
    pub fn grouped_by_venue(&self) -> std::collections::HashMap<String, Vec<Symbol>> {
        let mut grouped: std::collections::HashMap<String, Vec<Symbol>> = std::collections::HashMap::new();
        for entry in &self.symbols {
            let symbol = entry.value();
            if symbol.is_active {
                grouped.entry(symbol.venue.to_string()).or_default().push(symbol.clone());
            }
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use marketflow_model::{AssetClass, Venue};

    use super::*;

    fn sample(symbol: &str, venue: Venue) -> Symbol {
        Symbol {
            asset_class: AssetClass::Crypto,
            symbol: symbol.to_string(),
            venue,
            display_name: symbol.to_string(),
            is_active: true,
            metadata: Default::default(),
        }
    }

    #[test]
    fn groups_active_symbols_by_venue() {
        let catalog = SymbolCatalog::new();
        catalog.upsert(sample("BTC-USD", Venue::CryptoStream));
        catalog.upsert(sample("ETH-USD", Venue::CryptoStream));
        let mut inactive = sample("DEAD-USD", Venue::EquityPolled);
        inactive.is_active = false;
        catalog.upsert(inactive);

        let grouped = catalog.grouped_by_venue();
        assert_eq!(grouped.get("crypto_stream").map(Vec::len), Some(2));
        assert!(!grouped.contains_key("equity_polled"));
    }
}

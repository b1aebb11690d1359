use tracing::{debug, info, instrument, warn};

use loraprov_util::types::DeviceId;

use crate::inventory::InventoryClient;

// Upper bound on pages fetched, in case the remote ignores paging
const MAX_PAGES: u32 = 1_000;

/// Derives the next `<prefix>-<n>` device name from the inventory.
///
/// Names handed out by the same allocator are strictly increasing. Two
/// allocators running at the same time may still pick the same name, nothing
/// reserves a name before it is registered.
#[derive(Debug)]
pub struct IdentityAllocator {
    prefix: String,
    // wider than any parsed suffix, so the successor of a u64 always fits
    last: Option<u128>,
}

impl IdentityAllocator {
    pub const DEFAULT_PREFIX: &str = "auto";

    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            last: None,
        }
    }

    /// Return the numeric suffix of `name` if it is `<prefix>-<digits>`.
    ///
    /// Suffixes that do not fit a `u64` are ignored.
    fn suffix(&self, name: &str) -> Option<u64> {
        let digits = name.strip_prefix(&self.prefix)?.strip_prefix('-')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Pick the next name given the names already in use.
    pub fn next_name<'a>(&mut self, existing: impl IntoIterator<Item = &'a str>) -> DeviceId {
        let seen = existing
            .into_iter()
            .filter_map(|name| self.suffix(name))
            .max()
            .map(u128::from);
        let next = match seen.max(self.last) {
            Some(n) => n.saturating_add(1),
            None => 1,
        };
        self.last = Some(next);
        format!("{}-{next}", self.prefix)
    }

    /// Scan the inventory and pick the next name.
    ///
    /// Listing errors are not fatal, the scan stops and allocation goes on
    /// with whatever was seen until then.
    #[instrument(skip_all, fields(prefix = %self.prefix))]
    pub async fn allocate(&mut self, inventory: &InventoryClient) -> DeviceId {
        let mut names = Vec::new();
        for page in 1..=MAX_PAGES {
            match inventory.list_page(page).await {
                Ok(entries) => {
                    let last_page = entries.len() < inventory.page_size() as usize;
                    names.extend(entries.into_iter().map(|e| e.name));
                    if last_page {
                        break;
                    }
                }
                Err(err) => {
                    warn!("inventory listing failed, continuing with what was seen: {err}");
                    break;
                }
            }
        }
        debug!(existing = names.len(), "inventory scanned");

        let name = self.next_name(names.iter().map(String::as_str));
        info!(name = %name, "device name allocated");
        name
    }
}

// Beneficiary list queries - filters, sorting, pagination, statistics
//
// Every provided filter narrows the result (AND-combined). Both record
// stores apply the same `matches` predicate so results never diverge.

use crate::entities::{AccountStatus, Beneficiary, IdentityStatus};
use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// DATE WINDOW
// ============================================================================

/// Registration window relative to "now", applied to `created_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateWindow {
    Today,
    Week,
    Month,
}

impl DateWindow {
    /// Earliest `created_at` inside the window
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DateWindow::Today => {
                let midnight = now
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .unwrap_or_else(|| now.naive_utc());
                Utc.from_utc_datetime(&midnight)
            }
            DateWindow::Week => now - Duration::days(7),
            DateWindow::Month => now
                .checked_sub_months(Months::new(1))
                .unwrap_or_else(|| now - Duration::days(30)),
        }
    }
}

// ============================================================================
// FILTER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeneficiaryFilter {
    #[serde(default)]
    pub status: Option<AccountStatus>,
    #[serde(default)]
    pub identity_status: Option<IdentityStatus>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub governorate: Option<String>,
    #[serde(default)]
    pub created_within: Option<DateWindow>,
}

impl BeneficiaryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_identity_status(mut self, status: IdentityStatus) -> Self {
        self.identity_status = Some(status);
        self
    }

    pub fn with_search(mut self, term: &str) -> Self {
        self.search = Some(term.to_string());
        self
    }

    pub fn with_governorate(mut self, governorate: &str) -> Self {
        self.governorate = Some(governorate.to_string());
        self
    }

    pub fn created_within(mut self, window: DateWindow) -> Self {
        self.created_within = Some(window);
        self
    }

    /// Search term, trimmed; `None` when blank
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.identity_status.is_none()
            && self.search_term().is_none()
            && self.governorate.is_none()
            && self.created_within.is_none()
    }

    /// Check a single record against every provided filter
    pub fn matches(&self, b: &Beneficiary, now: DateTime<Utc>) -> bool {
        if let Some(status) = self.status {
            if b.status != status {
                return false;
            }
        }

        if let Some(identity) = self.identity_status {
            if b.identity_status != identity {
                return false;
            }
        }

        if let Some(term) = self.search_term() {
            // Names match case-insensitively, ids and phones as substrings
            let lower = term.to_lowercase();
            let hit = b.name.to_lowercase().contains(&lower)
                || b.full_name.to_lowercase().contains(&lower)
                || b.national_id.contains(term)
                || b.phone.contains(term);
            if !hit {
                return false;
            }
        }

        if let Some(governorate) = &self.governorate {
            if b.governorate.as_deref() != Some(governorate.as_str()) {
                return false;
            }
        }

        if let Some(window) = self.created_within {
            if b.created_at < window.start(now) {
                return false;
            }
        }

        true
    }

    /// Filter and order newest-first (the store listing order)
    pub fn apply<I>(&self, items: I) -> Vec<Beneficiary>
    where
        I: IntoIterator<Item = Beneficiary>,
    {
        let now = Utc::now();
        let mut result: Vec<Beneficiary> = items
            .into_iter()
            .filter(|b| self.matches(b, now))
            .collect();

        Sort::default().apply(&mut result);
        result
    }
}

// ============================================================================
// SORTING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Name,
    NationalId,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for Sort {
    fn default() -> Self {
        Sort {
            key: SortKey::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl Sort {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Sort { key, direction }
    }

    /// Clicking the same column flips direction, a new column starts ascending
    pub fn toggled(self, key: SortKey) -> Self {
        if self.key == key {
            let direction = match self.direction {
                SortDirection::Asc => SortDirection::Desc,
                SortDirection::Desc => SortDirection::Asc,
            };
            Sort { key, direction }
        } else {
            Sort::new(key, SortDirection::Asc)
        }
    }

    pub fn apply(&self, items: &mut [Beneficiary]) {
        items.sort_by(|a, b| {
            let ord = match self.key {
                SortKey::Name => a.display_name().cmp(b.display_name()),
                SortKey::NationalId => a.national_id.cmp(&b.national_id),
                SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            };
            // id as tiebreaker keeps pages stable across refetches
            let ord = ord.then_with(|| a.id.cmp(&b.id));
            match self.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
    }
}

// ============================================================================
// PAGINATION
// ============================================================================

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// 1-based page of a list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: usize,
    pub size: usize,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            number: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    pub fn new(number: usize, size: usize) -> Self {
        Page {
            number: number.max(1),
            size: size.max(1),
        }
    }

    // Fields are public and deserializable, so zero is treated as one here

    pub fn total_pages(&self, len: usize) -> usize {
        let size = self.size.max(1);
        (len + size - 1) / size
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let size = self.size.max(1);
        let start = self.number.saturating_sub(1).saturating_mul(size);
        if start >= items.len() {
            return &[];
        }
        let end = start.saturating_add(size).min(items.len());
        &items[start..end]
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: usize,
    pub verified: usize,
    pub pending: usize,
    pub rejected: usize,
    pub active: usize,
    pub suspended: usize,
}

impl Statistics {
    pub fn from_beneficiaries(items: &[Beneficiary]) -> Self {
        let mut stats = Statistics {
            total: items.len(),
            ..Statistics::default()
        };

        for b in items {
            match b.identity_status {
                IdentityStatus::Verified => stats.verified += 1,
                IdentityStatus::Pending => stats.pending += 1,
                IdentityStatus::Rejected => stats.rejected += 1,
            }
            match b.status {
                AccountStatus::Active => stats.active += 1,
                AccountStatus::Suspended => stats.suspended += 1,
                AccountStatus::Pending => {}
            }
        }

        stats
    }
}

// ============================================================================
// TESTS
// ============================================================================

use std::collections::{BTreeMap, HashSet};

/// Trimmed, lowercased estimator name; absent input normalizes to empty.
pub fn normalize_estimator(raw: Option<&str>) -> String {
    raw.map(|value| value.trim().to_lowercase()).unwrap_or_default()
}

/// Drops empty ids and repeats, keeping first-seen order.
pub fn dedupe_user_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    ids.into_iter()
        .map(|id| id.as_ref().trim().to_owned())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Who gets added to a new job channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvitePolicy {
    pub always_invite: Vec<String>,
    /// Normalized estimator name to platform user id.
    pub estimators: BTreeMap<String, String>,
}

impl InvitePolicy {
    pub fn new(always_invite: Vec<String>, estimators: BTreeMap<String, String>) -> Self {
        Self { always_invite, estimators }
    }

    pub fn estimator_user_id(&self, estimator: Option<&str>) -> Option<&str> {
        let key = normalize_estimator(estimator);
        if key.is_empty() {
            return None;
        }
        self.estimators.get(&key).map(String::as_str)
    }

    /// Baseline roster plus at most one estimator-derived id, deduplicated.
    pub fn resolve(&self, estimator: Option<&str>) -> Vec<String> {
        let mut invitees = self.always_invite.clone();
        if let Some(user_id) = self.estimator_user_id(estimator) {
            invitees.push(user_id.to_owned());
        }
        dedupe_user_ids(invitees)
    }
}

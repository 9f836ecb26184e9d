//! Social proof
//!
//! Recent public pledges rendered as name tags. On the success view the
//! signer's own tag is pinned first and marked "(you!)".

use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::db::schemas::PublicPledge;
use crate::store::{PledgeStore, DEFAULT_PUBLIC_LIMIT};

/// Landing page wall of names
pub const LANDING_LIMIT: usize = 20;

/// Success view after submitting
pub const SUCCESS_LIMIT: usize = 15;

/// Compact listings
pub const COMPACT_LIMIT: usize = DEFAULT_PUBLIC_LIMIT;

/// What to show when the listing cannot be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Success view: keep the pinned tag on its own
    ShowSelfOnly,
    /// Landing view: hide the whole section
    HideSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameTag {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_label: Option<String>,
    pub is_self: bool,
}

impl NameTag {
    pub fn from_pledge(pledge: &PublicPledge) -> Self {
        Self {
            name: pledge.display_name.clone(),
            class_label: pledge.child_class.clone().filter(|c| !c.trim().is_empty()),
            is_self: false,
        }
    }

    pub fn pinned(name: &str) -> Self {
        Self {
            name: name.to_string(),
            class_label: None,
            is_self: true,
        }
    }

    /// Text as shown on the tag
    pub fn label(&self) -> String {
        match (&self.class_label, self.is_self) {
            (_, true) => format!("{} (you!)", self.name),
            (Some(class), false) => format!("{} · {}", self.name, class),
            (None, false) => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "tags", rename_all = "lowercase")]
pub enum SocialProofView {
    Hidden,
    Tags(Vec<NameTag>),
}

impl SocialProofView {
    pub fn tags(&self) -> &[NameTag] {
        match self {
            SocialProofView::Hidden => &[],
            SocialProofView::Tags(tags) => tags,
        }
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self, SocialProofView::Hidden)
    }
}

pub struct SocialProofLoader {
    store: Arc<dyn PledgeStore>,
}

impl SocialProofLoader {
    pub fn new(store: Arc<dyn PledgeStore>) -> Self {
        Self { store }
    }

    /// Build the view for one call site.
    ///
    /// `pinned` is the signer's display name on the success view. Fetched
    /// tags with the same name are skipped so it only appears once.
    pub async fn load(
        &self,
        limit: usize,
        pinned: Option<&str>,
        policy: FailurePolicy,
    ) -> SocialProofView {
        let fetched = match self.store.fetch_public(limit).await {
            Ok(pledges) => Some(pledges),
            Err(e) => {
                warn!("Social proof unavailable: {}", e);
                None
            }
        };
        compose(fetched, pinned, policy)
    }
}

fn compose(
    fetched: Option<Vec<PublicPledge>>,
    pinned: Option<&str>,
    policy: FailurePolicy,
) -> SocialProofView {
    let pinned = pinned.map(str::trim).filter(|n| !n.is_empty());
    let mut tags: Vec<NameTag> = pinned.map(NameTag::pinned).into_iter().collect();

    match fetched {
        Some(pledges) => {
            tags.extend(
                pledges
                    .iter()
                    .filter(|p| Some(p.display_name.as_str()) != pinned)
                    .map(NameTag::from_pledge),
            );
        }
        None if policy == FailurePolicy::HideSection => return SocialProofView::Hidden,
        None => {}
    }

    if tags.is_empty() {
        SocialProofView::Hidden
    } else {
        SocialProofView::Tags(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::PledgeDoc;
    use crate::store::InMemoryPledgeStore;

    fn public_pledge(name: &str, class: Option<&str>) -> PledgeDoc {
        PledgeDoc {
            parent_name: name.into(),
            display_name: name.into(),
            is_public: true,
            child_class: class.map(str::to_string),
            ..Default::default()
        }
    }

    async fn seeded(names: &[&str]) -> Arc<InMemoryPledgeStore> {
        let store = Arc::new(InMemoryPledgeStore::new());
        for name in names {
            store.create(public_pledge(name, Some("Senior Infants"))).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_self_pinned_first_and_not_repeated() {
        let store = seeded(&["Aoife K.", "Sarah M.", "Tom B."]).await;
        let loader = SocialProofLoader::new(store);

        let view = loader
            .load(SUCCESS_LIMIT, Some("Sarah M."), FailurePolicy::ShowSelfOnly)
            .await;
        let labels: Vec<String> = view.tags().iter().map(NameTag::label).collect();
        assert_eq!(
            labels,
            vec![
                "Sarah M. (you!)",
                "Tom B. · Senior Infants",
                "Aoife K. · Senior Infants",
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_policies_differ() {
        let store = seeded(&["Aoife K."]).await;
        store.set_offline(true);
        let loader = SocialProofLoader::new(store);

        let success = loader
            .load(SUCCESS_LIMIT, Some("Sarah M."), FailurePolicy::ShowSelfOnly)
            .await;
        assert_eq!(success, SocialProofView::Tags(vec![NameTag::pinned("Sarah M.")]));

        let landing = loader.load(LANDING_LIMIT, None, FailurePolicy::HideSection).await;
        assert!(landing.is_hidden());
    }

    #[tokio::test]
    async fn test_landing_respects_limit() {
        let names: Vec<String> = (0..25).map(|i| format!("Family {}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let loader = SocialProofLoader::new(seeded(&refs).await);

        let view = loader.load(LANDING_LIMIT, None, FailurePolicy::HideSection).await;
        assert_eq!(view.tags().len(), LANDING_LIMIT);
        assert_eq!(view.tags()[0].name, "Family 24");
    }

    #[test]
    fn test_empty_listing_hides_landing() {
        let view = compose(Some(Vec::new()), None, FailurePolicy::HideSection);
        assert!(view.is_hidden());
    }

    #[test]
    fn test_blank_class_label_dropped() {
        let tag = NameTag::from_pledge(&PublicPledge {
            id: "x".into(),
            display_name: "Tom B.".into(),
            child_class: Some("  ".into()),
            created_at: String::new(),
        });
        assert_eq!(tag.label(), "Tom B.");
    }
}

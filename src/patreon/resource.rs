//! JSON:API document types for the Patreon v2 API.
//!
//! Patreon responds with JSON:API envelopes: a `data` member holding one or
//! many resources, an `included` side-table for relationship targets, and
//! cursor pagination under `links.next` / `meta.pagination.cursors.next`.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

/// A JSON:API response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub data: DocumentData,
    #[serde(default)]
    pub included: Vec<Resource>,
    #[serde(default)]
    pub links: Option<Links>,
    #[serde(default)]
    pub meta: Option<Meta>,
}

/// Primary data: a single resource or a collection.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DocumentData {
    Many(Vec<Resource>),
    One(Resource),
}

/// A single JSON:API resource object.
#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Value,
    #[serde(default)]
    pub relationships: HashMap<String, Relationship>,
}

/// A relationship entry pointing at another resource.
#[derive(Debug, Clone, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub data: Option<RelationshipData>,
}

/// Relationship linkage: single or to-many.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    One(ResourceIdentifier),
    Many(Vec<ResourceIdentifier>),
}

/// Bare (type, id) pair identifying a related resource.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceIdentifier {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub cursors: Option<Cursors>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cursors {
    #[serde(default)]
    pub next: Option<String>,
}

impl Resource {
    /// Deserialize the `attributes` member into a typed struct.
    pub fn attributes_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.attributes.clone())
    }

    /// The id of a to-one relationship, if present.
    pub fn related_id(&self, name: &str) -> Option<&str> {
        match self.relationships.get(name)?.data.as_ref()? {
            RelationshipData::One(ident) => Some(ident.id.as_str()),
            RelationshipData::Many(_) => None,
        }
    }
}

impl Document {
    /// Resources in the primary data, regardless of cardinality.
    pub fn resources(&self) -> Vec<&Resource> {
        match &self.data {
            DocumentData::Many(items) => items.iter().collect(),
            DocumentData::One(item) => vec![item],
        }
    }

    /// The single primary resource, if this document carries one.
    pub fn primary(&self) -> Option<&Resource> {
        match &self.data {
            DocumentData::One(item) => Some(item),
            DocumentData::Many(items) => items.first(),
        }
    }

    /// Index the `included` side-table by (type, id).
    pub fn included_index(&self) -> HashMap<(&str, &str), &Resource> {
        self.included
            .iter()
            .map(|resource| ((resource.kind.as_str(), resource.id.as_str()), resource))
            .collect()
    }

    /// Next-page cursor: `meta.pagination.cursors.next` wins, with
    /// `links.next`'s `page[cursor]` query parameter as the fallback.
    pub fn next_cursor(&self) -> Option<String> {
        if let Some(next) = self
            .meta
            .as_ref()
            .and_then(|meta| meta.pagination.as_ref())
            .and_then(|pagination| pagination.cursors.as_ref())
            .and_then(|cursors| cursors.next.clone())
        {
            return Some(next);
        }

        let next_link = self.links.as_ref()?.next.as_ref()?;
        let url = Url::parse(next_link).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page[cursor]")
            .map(|(_, value)| value.into_owned())
    }

    /// Total collection size if the server reported one.
    pub fn total(&self) -> Option<u64> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.pagination.as_ref())
            .and_then(|pagination| pagination.total)
    }
}

/// Typed attributes for `member` resources.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberAttributes {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub patron_status: Option<String>,
    #[serde(default)]
    pub currently_entitled_amount_cents: Option<i64>,
    #[serde(default)]
    pub lifetime_support_cents: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub pledge_cap_reached: Option<bool>,
    #[serde(default)]
    pub pledge_relationship_start: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub last_charge_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub last_charge_status: Option<String>,
}

/// Typed attributes for `user` resources (identity and member includes).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserAttributes {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Typed attributes for `campaign` resources.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignAttributes {
    #[serde(default)]
    pub creation_name: Option<String>,
    #[serde(default)]
    pub patron_count: Option<i32>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub is_monthly: Option<bool>,
}

/// Typed attributes for `post` resources.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostAttributes {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub is_paid: Option<bool>,
    #[serde(default)]
    pub like_count: Option<i32>,
    #[serde(default)]
    pub comment_count: Option<i32>,
    #[serde(default)]
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub edited_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn member_page() -> Document {
        serde_json::from_value(json!({
            "data": [
                {
                    "id": "member-1",
                    "type": "member",
                    "attributes": {
                        "full_name": "Ada Lovelace",
                        "patron_status": "active_patron",
                        "currently_entitled_amount_cents": 500
                    },
                    "relationships": {
                        "user": { "data": { "id": "user-1", "type": "user" } }
                    }
                }
            ],
            "included": [
                {
                    "id": "user-1",
                    "type": "user",
                    "attributes": { "email": "ada@example.com" }
                }
            ],
            "links": {
                "next": "https://www.patreon.com/api/oauth2/v2/campaigns/1/members?page%5Bcursor%5D=abc"
            },
            "meta": { "pagination": { "total": 42 } }
        }))
        .unwrap()
    }

    #[test]
    fn test_parses_member_page() {
        let doc = member_page();
        let resources = doc.resources();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].kind, "member");
        assert_eq!(resources[0].related_id("user"), Some("user-1"));

        let attrs: MemberAttributes = resources[0].attributes_as().unwrap();
        assert_eq!(attrs.full_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(attrs.currently_entitled_amount_cents, Some(500));
    }

    #[test]
    fn test_included_index_lookup() {
        let doc = member_page();
        let index = doc.included_index();
        let user = index.get(&("user", "user-1")).unwrap();
        let attrs: UserAttributes = user.attributes_as().unwrap();
        assert_eq!(attrs.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_next_cursor_from_links() {
        let doc = member_page();
        assert_eq!(doc.next_cursor().as_deref(), Some("abc"));
        assert_eq!(doc.total(), Some(42));
    }

    #[test]
    fn test_next_cursor_prefers_meta() {
        let doc: Document = serde_json::from_value(json!({
            "data": [],
            "links": { "next": "https://example.com?page%5Bcursor%5D=from-links" },
            "meta": { "pagination": { "cursors": { "next": "from-meta" } } }
        }))
        .unwrap();
        assert_eq!(doc.next_cursor().as_deref(), Some("from-meta"));
    }

    #[test]
    fn test_last_page_has_no_cursor() {
        let doc: Document = serde_json::from_value(json!({
            "data": [],
            "meta": { "pagination": { "total": 0 } }
        }))
        .unwrap();
        assert!(doc.next_cursor().is_none());
    }

    #[test]
    fn test_single_resource_document() {
        let doc: Document = serde_json::from_value(json!({
            "data": {
                "id": "user-9",
                "type": "user",
                "attributes": { "full_name": "Grace Hopper" }
            }
        }))
        .unwrap();
        let primary = doc.primary().unwrap();
        assert_eq!(primary.id, "user-9");
    }
}

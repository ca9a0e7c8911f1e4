//! Mapping from Patreon JSON:API resources to local entity rows.
//!
//! This is the single mapping path for member resources: the sync
//! orchestrator and the webhook ingestor both go through [`map_patron`], so
//! a field synced today and a field delivered by webhook tomorrow cannot
//! drift apart.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::Set;
use uuid::Uuid;

use crate::models::{campaign, patron, post};
use crate::patreon::client::PatreonError;
use crate::patreon::resource::{
    CampaignAttributes, MemberAttributes, PostAttributes, Resource, UserAttributes,
};

/// Translate a raw `patron_status` attribute into the local status enum.
pub fn patron_status_from(raw: Option<&str>) -> &'static str {
    match raw {
        Some("active_patron") => patron::STATUS_ACTIVE,
        Some("declined_patron") => patron::STATUS_DECLINED,
        // former_patron, null (never charged), and anything unknown
        _ => patron::STATUS_FORMER,
    }
}

/// Map a member resource (plus its `user` include) to a patron row.
///
/// `fallback_currency` is the campaign currency, used when the member
/// resource does not carry its own.
pub fn map_patron(
    campaign_id: Uuid,
    fallback_currency: &str,
    member: &Resource,
    included: &HashMap<(&str, &str), &Resource>,
) -> Result<patron::ActiveModel, PatreonError> {
    let attrs: MemberAttributes = member
        .attributes_as()
        .map_err(|err| PatreonError::Malformed(format!("member attributes: {}", err)))?;

    let external_user_id = member
        .related_id("user")
        .ok_or_else(|| {
            PatreonError::Malformed(format!("member {} missing user relationship", member.id))
        })?
        .to_string();

    let user_attrs: Option<UserAttributes> = included
        .get(&("user", external_user_id.as_str()))
        .and_then(|user| user.attributes_as().ok());

    let full_name = attrs
        .full_name
        .or_else(|| user_attrs.as_ref().and_then(|u| u.full_name.clone()))
        .unwrap_or_default();
    let email = attrs
        .email
        .or_else(|| user_attrs.as_ref().and_then(|u| u.email.clone()));

    let now = Utc::now().into();
    Ok(patron::ActiveModel {
        id: Set(Uuid::new_v4()),
        campaign_id: Set(campaign_id),
        external_user_id: Set(external_user_id),
        full_name: Set(full_name),
        email: Set(email),
        status: Set(patron_status_from(attrs.patron_status.as_deref()).to_string()),
        entitled_amount_cents: Set(attrs.currently_entitled_amount_cents.unwrap_or(0)),
        lifetime_support_cents: Set(attrs.lifetime_support_cents.unwrap_or(0)),
        currency: Set(attrs
            .currency
            .unwrap_or_else(|| fallback_currency.to_string())),
        pledge_cap_reached: Set(attrs.pledge_cap_reached.unwrap_or(false)),
        pledge_start: Set(attrs.pledge_relationship_start.map(Into::into)),
        last_charge_date: Set(attrs.last_charge_date.map(Into::into)),
        last_charge_status: Set(attrs.last_charge_status),
        created_at: Set(now),
        updated_at: Set(now),
    })
}

/// Map a post resource to a post row.
pub fn map_post(campaign_id: Uuid, resource: &Resource) -> Result<post::ActiveModel, PatreonError> {
    let attrs: PostAttributes = resource
        .attributes_as()
        .map_err(|err| PatreonError::Malformed(format!("post attributes: {}", err)))?;

    let now = Utc::now().into();
    Ok(post::ActiveModel {
        id: Set(Uuid::new_v4()),
        campaign_id: Set(campaign_id),
        external_post_id: Set(resource.id.clone()),
        title: Set(attrs.title.unwrap_or_default()),
        is_public: Set(attrs.is_public.unwrap_or(false)),
        is_paid: Set(attrs.is_paid.unwrap_or(false)),
        like_count: Set(attrs.like_count.unwrap_or(0)),
        comment_count: Set(attrs.comment_count.unwrap_or(0)),
        published_at: Set(attrs.published_at.map(Into::into)),
        edited_at: Set(attrs.edited_at.map(Into::into)),
        created_at: Set(now),
        updated_at: Set(now),
    })
}

/// Map a campaign resource to a campaign row under the given account.
pub fn map_campaign(
    account_id: Uuid,
    resource: &Resource,
) -> Result<campaign::ActiveModel, PatreonError> {
    let attrs: CampaignAttributes = resource
        .attributes_as()
        .map_err(|err| PatreonError::Malformed(format!("campaign attributes: {}", err)))?;

    let now = Utc::now().into();
    Ok(campaign::ActiveModel {
        id: Set(Uuid::new_v4()),
        account_id: Set(account_id),
        external_campaign_id: Set(resource.id.clone()),
        name: Set(attrs.creation_name.unwrap_or_default()),
        patron_count: Set(attrs.patron_count.unwrap_or(0)),
        pledge_sum_cents: Set(0),
        currency: Set(attrs.currency.unwrap_or_else(|| "USD".to_string())),
        last_synced_at: Set(None),
        is_active: Set(true),
        webhook_secret: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patreon::resource::Document;
    use sea_orm::ActiveValue;
    use serde_json::json;

    fn member_document() -> Document {
        serde_json::from_value(json!({
            "data": {
                "id": "member-1",
                "type": "member",
                "attributes": {
                    "full_name": "Ada Lovelace",
                    "patron_status": "active_patron",
                    "currently_entitled_amount_cents": 500,
                    "lifetime_support_cents": 6000,
                    "last_charge_status": "Paid"
                },
                "relationships": {
                    "user": { "data": { "id": "user-1", "type": "user" } }
                }
            },
            "included": [
                {
                    "id": "user-1",
                    "type": "user",
                    "attributes": { "email": "ada@example.com" }
                }
            ]
        }))
        .unwrap()
    }

    fn unwrap_set<T: Clone>(value: &ActiveValue<T>) -> T
    where
        T: Into<sea_orm::Value>,
    {
        match value {
            ActiveValue::Set(inner) => inner.clone(),
            _ => panic!("expected Set value"),
        }
    }

    #[test]
    fn test_map_patron_merges_user_include() {
        let doc = member_document();
        let campaign_id = Uuid::new_v4();
        let member = doc.primary().unwrap();
        let included = doc.included_index();

        let row = map_patron(campaign_id, "USD", member, &included).unwrap();

        assert_eq!(unwrap_set(&row.campaign_id), campaign_id);
        assert_eq!(unwrap_set(&row.external_user_id), "user-1");
        assert_eq!(unwrap_set(&row.full_name), "Ada Lovelace");
        assert_eq!(unwrap_set(&row.email), Some("ada@example.com".to_string()));
        assert_eq!(unwrap_set(&row.status), patron::STATUS_ACTIVE);
        assert_eq!(unwrap_set(&row.entitled_amount_cents), 500);
        assert_eq!(unwrap_set(&row.lifetime_support_cents), 6000);
        assert_eq!(unwrap_set(&row.currency), "USD");
    }

    #[test]
    fn test_map_patron_requires_user_relationship() {
        let campaign_id = Uuid::new_v4();
        let member: Resource = serde_json::from_value(json!({
            "id": "member-2",
            "type": "member",
            "attributes": {}
        }))
        .unwrap();

        let result = map_patron(campaign_id, "USD", &member, &HashMap::new());
        assert!(matches!(result, Err(PatreonError::Malformed(_))));
    }

    #[test]
    fn test_patron_status_translation() {
        assert_eq!(patron_status_from(Some("active_patron")), patron::STATUS_ACTIVE);
        assert_eq!(
            patron_status_from(Some("declined_patron")),
            patron::STATUS_DECLINED
        );
        assert_eq!(
            patron_status_from(Some("former_patron")),
            patron::STATUS_FORMER
        );
        assert_eq!(patron_status_from(None), patron::STATUS_FORMER);
        assert_eq!(patron_status_from(Some("mystery")), patron::STATUS_FORMER);
    }

    #[test]
    fn test_map_post_defaults() {
        let campaign_id = Uuid::new_v4();
        let resource: Resource = serde_json::from_value(json!({
            "id": "post-7",
            "type": "post",
            "attributes": { "title": "Hello", "is_public": true }
        }))
        .unwrap();

        let row = map_post(campaign_id, &resource).unwrap();
        assert_eq!(unwrap_set(&row.external_post_id), "post-7");
        assert_eq!(unwrap_set(&row.title), "Hello");
        assert!(unwrap_set(&row.is_public));
        assert!(!unwrap_set(&row.is_paid));
        assert_eq!(unwrap_set(&row.like_count), 0);
    }

    #[test]
    fn test_map_campaign() {
        let account_id = Uuid::new_v4();
        let resource: Resource = serde_json::from_value(json!({
            "id": "camp-1",
            "type": "campaign",
            "attributes": {
                "creation_name": "Science Lab",
                "patron_count": 12,
                "currency": "EUR"
            }
        }))
        .unwrap();

        let row = map_campaign(account_id, &resource).unwrap();
        assert_eq!(unwrap_set(&row.external_campaign_id), "camp-1");
        assert_eq!(unwrap_set(&row.name), "Science Lab");
        assert_eq!(unwrap_set(&row.patron_count), 12);
        assert_eq!(unwrap_set(&row.currency), "EUR");
        assert!(unwrap_set(&row.is_active));
    }
}

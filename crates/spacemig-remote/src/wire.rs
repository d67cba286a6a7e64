//! Management API wire format

use serde::{Deserialize, Serialize};
use spacemig_core::{
    AliasRecord, ApiKey, Entry, Environment, EnvironmentStatus, LocalizedFields, Locale,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LinkSys {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(rename = "linkType")]
    pub(crate) link_type: String,
    pub(crate) id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Link {
    pub(crate) sys: LinkSys,
}

impl Link {
    pub(crate) fn environment(id: &str) -> Self {
        Self {
            sys: LinkSys {
                kind: "Link".to_string(),
                link_type: "Environment".to_string(),
                id: id.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Sys {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) version: Option<u64>,
    #[serde(rename = "publishedVersion", default)]
    pub(crate) published_version: Option<u64>,
    #[serde(default)]
    pub(crate) status: Option<Link>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Collection<T> {
    pub(crate) items: Vec<T>,
    #[serde(default)]
    pub(crate) total: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnvironmentDto {
    pub(crate) sys: Sys,
    pub(crate) name: String,
}

impl EnvironmentDto {
    pub(crate) fn status(&self) -> EnvironmentStatus {
        self.sys
            .status
            .as_ref()
            .map_or(EnvironmentStatus::Processing, |s| {
                EnvironmentStatus::from_remote(&s.sys.id)
            })
    }
}

impl From<EnvironmentDto> for Environment {
    fn from(dto: EnvironmentDto) -> Self {
        let status = dto.status();
        Self {
            id: dto.sys.id.as_str().into(),
            name: dto.name,
            status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiKeyDto {
    pub(crate) sys: Sys,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) environments: Vec<Link>,
}

impl From<ApiKeyDto> for ApiKey {
    fn from(dto: ApiKeyDto) -> Self {
        Self {
            id: dto.sys.id,
            name: dto.name,
            description: dto.description,
            version: dto.sys.version.unwrap_or_default(),
            environments: dto.environments.into_iter().map(|l| l.sys.id).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiKeyBody<'a> {
    pub(crate) name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<&'a str>,
    pub(crate) environments: Vec<Link>,
}

impl<'a> From<&'a ApiKey> for ApiKeyBody<'a> {
    fn from(key: &'a ApiKey) -> Self {
        Self {
            name: &key.name,
            description: key.description.as_deref(),
            environments: key.environments.iter().map(|e| Link::environment(e)).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AliasDto {
    pub(crate) sys: Sys,
    pub(crate) environment: Link,
}

impl From<AliasDto> for AliasRecord {
    fn from(dto: AliasDto) -> Self {
        Self {
            name: dto.sys.id,
            target_environment_id: dto.environment.sys.id,
            version: dto.sys.version.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AliasBody {
    pub(crate) environment: Link,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LocaleDto {
    pub(crate) code: String,
    #[serde(default)]
    pub(crate) default: bool,
}

impl From<LocaleDto> for Locale {
    fn from(dto: LocaleDto) -> Self {
        Self {
            code: dto.code,
            default: dto.default,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct EntryDto {
    pub(crate) sys: Sys,
    #[serde(default)]
    pub(crate) fields: LocalizedFields,
}

impl From<EntryDto> for Entry {
    fn from(dto: EntryDto) -> Self {
        Self {
            id: dto.sys.id,
            version: dto.sys.version.unwrap_or_default(),
            published_version: dto.sys.published_version,
            fields: dto.fields,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EntryBody {
    pub(crate) fields: LocalizedFields,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn environment_status_comes_from_link() {
        let dto: EnvironmentDto = serde_json::from_value(json!({
            "name": "staging-2024-01-01-1200",
            "sys": {
                "id": "staging-2024-01-01-1200",
                "version": 3,
                "status": { "sys": { "type": "Link", "linkType": "Status", "id": "ready" } }
            }
        }))
        .unwrap();
        let environment = Environment::from(dto);
        assert_eq!(environment.status, EnvironmentStatus::Ready);
        assert_eq!(environment.id.as_str(), "staging-2024-01-01-1200");

        let dto: EnvironmentDto =
            serde_json::from_value(json!({ "name": "x", "sys": { "id": "x" } })).unwrap();
        assert_eq!(dto.status(), EnvironmentStatus::Processing);
    }

    #[test]
    fn api_key_round_trips_links() {
        let dto: ApiKeyDto = serde_json::from_value(json!({
            "name": "Website",
            "sys": { "id": "key1", "version": 7 },
            "environments": [
                { "sys": { "type": "Link", "linkType": "Environment", "id": "master" } }
            ]
        }))
        .unwrap();
        let mut key = ApiKey::from(dto);
        assert_eq!(key.version, 7);
        assert_eq!(key.environments, vec!["master".to_string()]);

        key.environments.push("qa".into());
        let body = serde_json::to_value(ApiKeyBody::from(&key)).unwrap();
        assert_eq!(
            body,
            json!({
                "name": "Website",
                "environments": [
                    { "sys": { "type": "Link", "linkType": "Environment", "id": "master" } },
                    { "sys": { "type": "Link", "linkType": "Environment", "id": "qa" } }
                ]
            })
        );
    }

    #[test]
    fn api_key_description_is_written_back() {
        let dto: ApiKeyDto = serde_json::from_value(json!({
            "name": "Website",
            "description": "Used by the production website",
            "sys": { "id": "key1", "version": 3 },
            "environments": []
        }))
        .unwrap();
        let mut key = ApiKey::from(dto);
        assert_eq!(key.description.as_deref(), Some("Used by the production website"));

        key.environments.push("qa".into());
        let body = serde_json::to_value(ApiKeyBody::from(&key)).unwrap();
        assert_eq!(body["name"], "Website");
        assert_eq!(body["description"], "Used by the production website");
        assert_eq!(body["environments"][0]["sys"]["id"], "qa");
    }

    #[test]
    fn entry_keeps_published_version() {
        let dto: EntryDto = serde_json::from_value(json!({
            "sys": { "id": "e1", "version": 4, "publishedVersion": 3 },
            "fields": { "version": { "en-US": "1.0.0" } }
        }))
        .unwrap();
        let entry = Entry::from(dto);
        assert!(entry.is_published());
        assert_eq!(entry.field("version", Some("en-US")), Some(&json!("1.0.0")));

        let draft: EntryDto =
            serde_json::from_value(json!({ "sys": { "id": "e2", "version": 1 } })).unwrap();
        assert!(!Entry::from(draft).is_published());
    }

    #[test]
    fn alias_target_comes_from_environment_link() {
        let dto: AliasDto = serde_json::from_value(json!({
            "sys": { "id": "master", "version": 2 },
            "environment": { "sys": { "type": "Link", "linkType": "Environment", "id": "master-2023" } }
        }))
        .unwrap();
        assert_eq!(
            AliasRecord::from(dto),
            AliasRecord {
                name: "master".into(),
                target_environment_id: "master-2023".into(),
                version: 2,
            }
        );
    }
}

/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 */

//! Mapping of OIDC claims (ID token or UserInfo) to a [`Profile`].

use forward_auth_types::{Profile, ProfileEmail, ProfileName};
use serde_json::Value;

use crate::error::AuthError;

/// Decoded JSON claims, from an ID token or a UserInfo response.
pub type ClaimsMap = serde_json::Map<String, Value>;

fn non_empty_str<'a>(claims: &'a ClaimsMap, key: &str) -> Option<&'a str> {
    claims
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Coalesce `name`, `given_name family_name`, `preferred_username`, then `email`.
pub fn display_name(claims: &ClaimsMap) -> String {
    if let Some(name) = non_empty_str(claims, "name") {
        return name.to_string();
    }
    match (
        non_empty_str(claims, "given_name"),
        non_empty_str(claims, "family_name"),
    ) {
        (Some(g), Some(f)) => return format!("{g} {f}"),
        (Some(g), None) => return g.to_string(),
        _ => {}
    }
    non_empty_str(claims, "preferred_username")
        .or_else(|| non_empty_str(claims, "email"))
        .unwrap_or_default()
        .to_string()
}

/// Build a profile for `provider` from standard OIDC claims.
///
/// `sub` becomes the profile ID; providers with a different identifier
/// overwrite it afterwards.
pub fn profile_from_claims(provider: &str, claims: &ClaimsMap) -> Result<Profile, AuthError> {
    let id = non_empty_str(claims, "sub").ok_or_else(|| AuthError::MissingClaim("sub".into()))?;

    let email = non_empty_str(claims, "email").map(|value| ProfileEmail {
        value: value.to_string(),
        verified: claims
            .get("email_verified")
            .is_some_and(is_truthy),
    });

    let nickname = non_empty_str(claims, "nickname")
        .or_else(|| non_empty_str(claims, "preferred_username"))
        .map(str::to_string);

    Ok(Profile {
        provider: provider.to_string(),
        id: id.to_string(),
        email,
        name: ProfileName {
            full_name: display_name(claims),
            nickname,
        },
        picture: non_empty_str(claims, "picture").map(str::to_string),
        additional_claims: Default::default(),
    })
}

// Some providers send `email_verified` as the string "true".
fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Copy each of `keys` present in `claims` into `profile.additional_claims`.
pub fn copy_claims(profile: &mut Profile, claims: &ClaimsMap, keys: &[&str]) {
    for key in keys {
        if let Some(v) = claims.get(*key).filter(|v| !v.is_null()) {
            profile.additional_claims.insert((*key).to_string(), v.clone());
        }
    }
}

/// Invoke `set` for each of `keys` present in `claims`.
pub fn forward_claims(claims: &ClaimsMap, keys: &[&str], set: &mut dyn FnMut(&str, Value)) {
    for key in keys {
        if let Some(v) = claims.get(*key).filter(|v| !v.is_null()) {
            set(key, v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(v: Value) -> ClaimsMap {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn display_name_uses_name_field() {
        let c = claims(json!({ "name": "Alice", "given_name": "Al", "family_name": "Ice" }));
        assert_eq!(display_name(&c), "Alice");
    }

    #[test]
    fn display_name_falls_back_to_given_family() {
        let c = claims(json!({ "given_name": "Al", "family_name": "Ice" }));
        assert_eq!(display_name(&c), "Al Ice");
    }

    #[test]
    fn display_name_falls_back_to_username_then_email() {
        let c = claims(json!({ "preferred_username": "al", "email": "a@b.com" }));
        assert_eq!(display_name(&c), "al");
        let c = claims(json!({ "email": "a@b.com" }));
        assert_eq!(display_name(&c), "a@b.com");
        assert_eq!(display_name(&ClaimsMap::new()), "");
    }

    #[test]
    fn profile_maps_standard_claims() {
        let c = claims(json!({
            "sub": "12345",
            "name": "Alice",
            "email": "alice@example.com",
            "email_verified": true,
            "picture": "https://example.com/a.png",
            "preferred_username": "alice"
        }));
        let p = profile_from_claims("google", &c).unwrap();
        assert_eq!(p.provider, "google");
        assert_eq!(p.id, "12345");
        assert_eq!(p.name.full_name, "Alice");
        assert_eq!(p.name.nickname.as_deref(), Some("alice"));
        assert_eq!(
            p.email,
            Some(ProfileEmail {
                value: "alice@example.com".into(),
                verified: true
            })
        );
        assert_eq!(p.picture.as_deref(), Some("https://example.com/a.png"));
        assert!(p.additional_claims.is_empty());
    }

    #[test]
    fn string_email_verified_is_accepted() {
        let c = claims(json!({ "sub": "1", "email": "a@b.com", "email_verified": "true" }));
        assert!(profile_from_claims("oidc", &c).unwrap().email.unwrap().verified);
    }

    #[test]
    fn missing_sub_is_a_missing_claim() {
        let c = claims(json!({ "name": "Alice" }));
        match profile_from_claims("oidc", &c).unwrap_err() {
            AuthError::MissingClaim(claim) => assert_eq!(claim, "sub"),
            other => panic!("unexpected error: {other:?}"),
        }
        let c = claims(json!({ "sub": "" }));
        assert!(matches!(
            profile_from_claims("oidc", &c),
            Err(AuthError::MissingClaim(_))
        ));
    }

    #[test]
    fn copy_and_forward_skip_absent_keys() {
        let c = claims(json!({ "tid": "tenant", "wids": ["a"], "other": 1, "hd": null }));
        let mut p = Profile::default();
        copy_claims(&mut p, &c, &["tid", "wids", "hd", "missing"]);
        assert_eq!(p.additional_claims.len(), 2);
        assert_eq!(p.claim_str("tid"), Some("tenant"));

        let mut seen = Vec::new();
        forward_claims(&c, &["wids", "missing"], &mut |k, v| seen.push((k.to_string(), v)));
        assert_eq!(seen, vec![("wids".to_string(), json!(["a"]))]);
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use super::*;
use crate::session::persist::{FileStore, MemoryStore};

fn tokens(access: &str, refresh: &str) -> TokenSet {
    TokenSet {
        access_token: access.to_owned(),
        refresh_token: refresh.to_owned(),
        expires_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap_or_default(),
    }
}

#[test]
fn set_session_writes_all_three_keys() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryStore::new());
    let store = TokenStore::new(backend.clone());
    store.set_session(&tokens("A1", "R1"))?;

    assert_eq!(store.access_token().as_deref(), Some("A1"));
    assert_eq!(store.refresh_token().as_deref(), Some("R1"));
    assert!(store.snapshot().is_refreshable());
    assert_eq!(backend.get(ACCESS_TOKEN_KEY).as_deref(), Some("A1"));
    assert_eq!(backend.get(REFRESH_TOKEN_KEY).as_deref(), Some("R1"));
    assert!(backend.get(EXPIRES_AT_KEY).is_some());
    Ok(())
}

#[test]
fn static_token_drops_refresh_state() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryStore::new());
    let store = TokenStore::new(backend.clone());
    store.set_session(&tokens("A1", "R1"))?;
    store.set_access_token("api-key")?;

    let snap = store.snapshot();
    assert_eq!(snap.access_token.as_deref(), Some("api-key"));
    assert_eq!(snap.refresh_token, None);
    assert_eq!(snap.expires_at, None);
    assert!(!snap.is_refreshable());
    assert_eq!(backend.get(REFRESH_TOKEN_KEY), None);
    Ok(())
}

#[test]
fn clear_wipes_memory_and_backend() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryStore::new());
    let store = TokenStore::new(backend.clone());
    store.set_session(&tokens("A1", "R1"))?;
    store.clear();

    assert_eq!(store.snapshot(), Credentials::default());
    assert_eq!(backend.get(ACCESS_TOKEN_KEY), None);
    assert_eq!(backend.get(REFRESH_TOKEN_KEY), None);
    assert_eq!(backend.get(EXPIRES_AT_KEY), None);
    Ok(())
}

#[test]
fn reload_from_file_restores_session() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    let set = tokens("A1", "R1");
    {
        let store = TokenStore::new(Arc::new(FileStore::open(&path)));
        store.set_session(&set)?;
    }
    let store = TokenStore::new(Arc::new(FileStore::open(&path)));
    assert_eq!(store.access_token().as_deref(), Some("A1"));
    assert_eq!(store.refresh_token().as_deref(), Some("R1"));
    assert_eq!(store.expires_at(), Some(set.expires_at));
    Ok(())
}

#[test]
fn unparseable_expiry_is_ignored() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryStore::new());
    backend.set(ACCESS_TOKEN_KEY, "A1".into())?;
    backend.set(EXPIRES_AT_KEY, "yesterday".into())?;
    let store = TokenStore::new(backend);
    assert_eq!(store.access_token().as_deref(), Some("A1"));
    assert_eq!(store.expires_at(), None);
    Ok(())
}

#[test]
fn failed_persist_leaves_memory_untouched() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    std::fs::create_dir(&path)?;
    let store = TokenStore::new(Arc::new(FileStore::open(&path)));

    let mut set = tokens("A1", "R1");
    set.expires_at += Duration::minutes(5);
    assert!(store.set_session(&set).is_err());
    assert_eq!(store.access_token(), None);
    Ok(())
}

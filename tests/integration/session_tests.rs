use super::*;
use catalog_sync::session::SessionState;
use std::fs;

#[tokio::test]
async fn test_valid_profile_skips_login() -> anyhow::Result<()> {
    let harness = Harness::new(|s| s.logged_in = true);
    let mut session = harness.session();

    session.start().await?;

    assert_eq!(session.state(), SessionState::Authenticated);
    assert!(session.probe().await);
    harness.with_state(|s| {
        assert_eq!(s.launches, 1);
        assert!(s.filled.is_empty());
        assert_eq!(s.visits[START_URL], 1);
    });
    Ok(())
}

#[tokio::test]
async fn test_marker_without_expected_text_is_not_a_session() -> anyhow::Result<()> {
    let harness = Harness::with_config(|s| s.login_works = false, |c| c.retry.login_attempts = 1);
    let mut session = harness.session();
    session.start().await?;
    session.browser()?.navigate(START_URL, Duration::from_millis(10)).await?;

    // The cart element is rendered logged out as well, only its text differs.
    assert!(!session.probe().await);
    harness.with_state(|s| assert_eq!(s.url, START_URL));
    Ok(())
}

#[tokio::test]
async fn test_stale_profile_is_wiped_before_login() -> anyhow::Result<()> {
    let harness = Harness::new(|_| {});
    let profile = &harness.config.paths.profile_dir;
    fs::create_dir_all(profile.join("Default"))?;
    fs::write(profile.join("Default/Cookies"), b"expired")?;

    let mut session = harness.session();
    session.start().await?;

    assert_eq!(session.state(), SessionState::Authenticated);
    assert!(profile.exists());
    assert!(!profile.join("Default/Cookies").exists());
    harness.with_state(|s| {
        assert_eq!(s.launches, 2);
        assert_eq!(s.closed, 1);
        assert_eq!(
            s.filled,
            vec![
                ("#email".to_string(), "einkauf@example.test".to_string()),
                ("#password".to_string(), "geheim".to_string()),
            ]
        );
    });

    let snapshot = fs::read_to_string(&harness.config.paths.cookie_file)?;
    assert!(snapshot.contains("\"httpOnly\": true"));
    Ok(())
}

#[tokio::test]
async fn test_cookie_snapshot_restored_into_fresh_profile() -> anyhow::Result<()> {
    let harness = Harness::new(|s| s.logged_in = true);
    let cookie_file = &harness.config.paths.cookie_file;
    fs::create_dir_all(cookie_file.parent().unwrap())?;
    fs::write(cookie_file, r#"[{"name":"session","value":"abc","domain":"shop.test"},{"name":"consent","value":"1"}]"#)?;

    let mut session = harness.session();
    session.start().await?;

    harness.with_state(|s| assert_eq!(s.restored_cookies, vec!["session".to_string(), "consent".to_string()]));
    Ok(())
}

#[tokio::test]
async fn test_login_exhaustion_leaves_run_alive() -> anyhow::Result<()> {
    let harness = Harness::with_config(|s| s.login_works = false, |c| c.retry.login_attempts = 2);
    let mut session = harness.session();

    session.start().await?;

    assert_eq!(session.state(), SessionState::LoginFailed);
    assert!(session.browser().is_ok());
    // Initial context, fresh context for login, one relaunch between attempts.
    harness.with_state(|s| assert_eq!(s.launches, 3));
    assert!(!harness.config.paths.cookie_file.exists());
    Ok(())
}

#[tokio::test]
async fn test_launch_failure_is_reported() {
    let harness = Harness::with_config(|s| s.fail_launches_from = Some(1), |c| c.retry.launch_attempts = 2);
    let mut session = harness.session();

    let err = session.start().await.unwrap_err();

    assert!(matches!(err, AppError::Browser(_)));
    assert!(!err.is_fatal());
    harness.with_state(|s| assert_eq!(s.launches, 2));
}

#[tokio::test]
async fn test_check_session_without_context_logs_in_again() -> anyhow::Result<()> {
    let harness = Harness::new(|s| s.logged_in = true);
    let mut session = harness.started_session().await;
    session.shutdown().await;
    assert!(matches!(session.browser(), Err(AppError::NoBrowser)));

    harness.with_state(|s| s.logged_in = false);
    session.check_session().await?;

    assert_eq!(session.state(), SessionState::Authenticated);
    harness.with_state(|s| assert_eq!(s.launches, 2));
    Ok(())
}

#[tokio::test]
async fn test_proxy_failure_on_landing_page_is_fatal() {
    let harness = Harness::new(|s| {
        s.nav_failures.push(("shop.test/home".to_string(), LoadError::Navigation("net::ERR_TUNNEL_CONNECTION_FAILED".to_string()), 1));
    });
    let proxy = ProxyCandidate::new("10.0.0.1:8080");
    let mut session = SessionManager::new(harness.config.clone(), harness.launcher(), Harness::credentials(), Some(proxy)).unwrap();

    let err = session.start().await.unwrap_err();

    match err {
        AppError::ProxyConnection { proxy, .. } => assert_eq!(proxy, "10.0.0.1:8080"),
        other => panic!("unexpected error: {other}"),
    }
    harness.with_state(|s| assert_eq!(s.proxies_used, vec![Some("10.0.0.1:8080".to_string())]));
}

use super::*;
use catalog_sync::extraction::ExtractionEngine;
use catalog_sync::models::{ExtractionSource, ExtractionStatus, ItemQuery, LoadFailure};

const ITEM_URL: &str = "https://shop.test/details/7501234";

fn item() -> ItemQuery {
    ItemQuery::new("7501234").unwrap()
}

fn logged_in_shop(page: ItemPage) -> Harness {
    Harness::new(|s| {
        s.logged_in = true;
        s.items.insert("7501234".to_string(), page);
    })
}

#[tokio::test]
async fn test_primary_layout_on_first_attempt() -> anyhow::Result<()> {
    let harness = logged_in_shop(ItemPage::primary("7501234", "120,00 €").with("#p-sale", "Abverkauf"));
    let mut session = harness.started_session().await;
    let engine = ExtractionEngine::new(harness.config.clone());

    let result = engine.extract(&mut session, &item()).await?;

    assert_eq!(result.status, ExtractionStatus::SuccessPrimary { attempt: 1 });
    assert_eq!(result.source.to_string(), "primary (attempt 1)");
    assert_eq!(result.material_code, "7501234");
    assert_eq!(result.availability, "Lieferbar");
    assert_eq!(result.gross_price, "120,00 €");
    assert_eq!(result.net_price, "N/A");
    assert_eq!(result.sale_note, "Abverkauf");
    harness.with_state(|s| assert_eq!(s.visits[ITEM_URL], 1));
    Ok(())
}

#[tokio::test]
async fn test_primary_layout_renders_late() -> anyhow::Result<()> {
    let mut page = ItemPage::primary("7501234", "120,00 €");
    page.primary_from_visit = 2;
    let harness = logged_in_shop(page);
    let mut session = harness.started_session().await;

    let result = ExtractionEngine::new(harness.config.clone()).extract(&mut session, &item()).await?;

    assert_eq!(result.status.to_string(), "Success (primary - attempt 2)");
    harness.with_state(|s| assert_eq!(s.visits[ITEM_URL], 2));
    Ok(())
}

#[tokio::test]
async fn test_table_layout_after_primary_attempts_run_out() -> anyhow::Result<()> {
    let harness = logged_in_shop(ItemPage::table("7501234", "1.299,00 €").with("#p-sale", "Restposten"));
    let mut session = harness.started_session().await;

    let result = ExtractionEngine::new(harness.config.clone()).extract(&mut session, &item()).await?;

    assert_eq!(result.status, ExtractionStatus::SuccessFallback);
    assert_eq!(result.source, ExtractionSource::Fallback);
    assert_eq!(result.material_code, "7501234");
    assert_eq!(result.availability, "2-3 Tage");
    assert_eq!(result.gross_price, "1.299,00 €");
    assert_eq!(result.net_price, "9,99 €");
    assert_eq!(result.sale_note, "Restposten");
    // Three primary visits plus one for the table layout.
    harness.with_state(|s| assert_eq!(s.visits[ITEM_URL], 4));
    Ok(())
}

#[tokio::test]
async fn test_not_found_by_either_layout() -> anyhow::Result<()> {
    let harness = logged_in_shop(ItemPage::default());
    let mut session = harness.started_session().await;

    let result = ExtractionEngine::new(harness.config.clone()).extract(&mut session, &item()).await?;

    assert_eq!(result.status, ExtractionStatus::NotFound);
    assert_eq!(result.source.to_string(), "failed both");
    assert_eq!(result.to_record()[8], "Failed (not found via either strategy)");
    assert!(!result.status.is_success());
    Ok(())
}

#[tokio::test]
async fn test_timeouts_on_every_attempt() -> anyhow::Result<()> {
    let harness = logged_in_shop(ItemPage::primary("7501234", "1,00 €"));
    harness.with_state(|s| {
        s.nav_failures.push(("/details/".to_string(), LoadError::Timeout("35000ms".to_string()), 3));
    });
    let mut session = harness.started_session().await;

    let result = ExtractionEngine::new(harness.config.clone()).extract(&mut session, &item()).await?;

    assert_eq!(result.status, ExtractionStatus::LoadFailed { cause: LoadFailure::Timeout, attempts: 3 });
    assert_eq!(result.status.to_string(), "Failed (timeout loading page after 3 attempts)");
    assert_eq!(result.material_code, "N/A");
    harness.with_state(|s| {
        assert_eq!(s.screenshots.len(), 3);
        let name = s.screenshots[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("error_timeout_7501234_"));
    });
    Ok(())
}

#[tokio::test]
async fn test_transient_navigation_error_is_retried() -> anyhow::Result<()> {
    let harness = logged_in_shop(ItemPage::primary("7501234", "1,00 €"));
    harness.with_state(|s| {
        s.nav_failures.push(("/details/".to_string(), LoadError::Navigation("net::ERR_CONNECTION_RESET".to_string()), 1));
    });
    let mut session = harness.started_session().await;

    let result = ExtractionEngine::new(harness.config.clone()).extract(&mut session, &item()).await?;

    assert_eq!(result.status, ExtractionStatus::SuccessPrimary { attempt: 2 });
    Ok(())
}

#[tokio::test]
async fn test_proxy_failure_is_fatal() {
    let harness = logged_in_shop(ItemPage::primary("7501234", "1,00 €"));
    harness.with_state(|s| {
        s.nav_failures.push((
            "/details/".to_string(),
            LoadError::Navigation("net::ERR_PROXY_CONNECTION_FAILED at https://shop.test".to_string()),
            1,
        ));
    });
    let mut session = harness.started_session().await;

    let err = ExtractionEngine::new(harness.config.clone())
        .extract(&mut session, &item())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ProxyConnection { .. }));
    assert!(err.is_fatal());
    harness.with_state(|s| {
        let name = s.screenshots[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("error_proxy_"));
    });
}

#[tokio::test]
async fn test_table_layout_page_error() -> anyhow::Result<()> {
    let harness = logged_in_shop(ItemPage::table("7501234", "1,00 €"));
    harness.with_state(|s| {
        s.fail_on_visit.push((ITEM_URL.to_string(), 4, LoadError::Navigation("net::ERR_ABORTED".to_string())));
    });
    let mut session = harness.started_session().await;

    let result = ExtractionEngine::new(harness.config.clone()).extract(&mut session, &item()).await?;

    assert_eq!(result.status, ExtractionStatus::FallbackError);
    assert_eq!(result.source, ExtractionSource::FallbackError);
    assert_eq!(result.status.to_string(), "Error (fallback extraction)");
    assert_eq!(result.material_code, "N/A");
    Ok(())
}

#[tokio::test]
async fn test_expired_session_is_renewed_before_extraction() -> anyhow::Result<()> {
    let harness = logged_in_shop(ItemPage::primary("7501234", "1,00 €"));
    harness.with_state(|s| s.probes_before_expiry = Some(1));
    let mut session = harness.started_session().await;
    assert_eq!(harness.with_state(|s| s.launches), 1);

    let result = ExtractionEngine::new(harness.config.clone()).extract(&mut session, &item()).await?;

    assert!(result.status.is_success());
    harness.with_state(|s| {
        assert_eq!(s.launches, 2);
        assert!(s.filled.iter().any(|(field, value)| field == "#email" && value == "einkauf@example.test"));
    });
    Ok(())
}

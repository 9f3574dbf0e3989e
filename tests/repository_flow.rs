mod common;

use anyhow::Result;
use chrono::NaiveDate;
use common::{acquire_db_lock, test_pool, truncate};
use senado_sync::models::{ActChanges, NewLegislativeAct};
use senado_sync::repository::{ActRepository, PgActRepository, UpsertOutcome};

fn act(code: &str, act_type: &str, year: i32) -> NewLegislativeAct {
    NewLegislativeAct {
        code: code.to_string(),
        act_type: act_type.to_string(),
        number: code.rsplit('-').nth(1).unwrap_or("0").to_string(),
        norm_name: format!("{act_type} {code}"),
        description: Some(format!("Descrição de {code}")),
        summary: Some(format!("Ementa de {code}")),
        signing_date: NaiveDate::from_ymd_opt(year, 3, 5),
        signing_year: Some(year),
        alias: Some("apelido".to_string()),
    }
}

#[tokio::test]
async fn upsert_creates_then_overwrites_by_code() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let repository = PgActRepository::new(pool.clone());

    let (created, outcome) = repository
        .upsert_by_code(act("LEI-14133-2021", "LEI", 2021))
        .await?;
    assert_eq!(outcome, UpsertOutcome::Created);

    let replacement = NewLegislativeAct {
        alias: None,
        signing_date: None,
        norm_name: "Lei de Licitações".to_string(),
        ..act("LEI-14133-2021", "LEI", 2021)
    };
    let (updated, outcome) = repository.upsert_by_code(replacement).await?;
    assert_eq!(outcome, UpsertOutcome::Updated);
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.norm_name, "Lei de Licitações");
    assert_eq!(updated.alias, None);
    assert_eq!(updated.signing_date, None);
    assert_eq!(repository.find_all().await?.len(), 1);

    truncate(&pool).await?;
    Ok(())
}

#[tokio::test]
async fn partial_update_leaves_omitted_columns() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let repository = PgActRepository::new(pool.clone());
    let created = repository.create(act("DEC-10024-2021", "DEC", 2021)).await?;

    let changes = ActChanges {
        summary: Some(Some("Nova ementa".to_string())),
        alias: Some(None),
        ..ActChanges::default()
    };
    let updated = repository
        .update(created.id, changes)
        .await?
        .expect("row exists");
    assert_eq!(updated.summary.as_deref(), Some("Nova ementa"));
    assert_eq!(updated.alias, None);
    assert_eq!(updated.description, created.description);
    assert_eq!(updated.signing_year, Some(2021));

    assert!(repository
        .update(created.id + 1000, ActChanges::default())
        .await?
        .is_none());

    truncate(&pool).await?;
    Ok(())
}

#[tokio::test]
async fn lookups_and_delete() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let repository = PgActRepository::new(pool.clone());
    let lei = repository.create(act("LEI-1-2020", "LEI", 2020)).await?;
    repository.create(act("LEI-2-2021", "LEI", 2021)).await?;
    repository.create(act("DEC-3-2021", "DEC", 2021)).await?;

    assert_eq!(repository.find_by_year(2021).await?.len(), 2);
    assert_eq!(repository.find_by_type("LEI").await?.len(), 2);
    assert_eq!(
        repository.find_by_code("LEI-1-2020").await?.map(|row| row.id),
        Some(lei.id)
    );
    assert_eq!(repository.find_by_id(lei.id).await?, Some(lei.clone()));

    assert!(repository.delete(lei.id).await?);
    assert!(!repository.delete(lei.id).await?);
    assert!(repository.find_by_id(lei.id).await?.is_none());

    truncate(&pool).await?;
    Ok(())
}

#[tokio::test]
async fn duplicate_codes_are_rejected_on_create() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let repository = PgActRepository::new(pool.clone());
    repository.create(act("LEI-5-2019", "LEI", 2019)).await?;

    assert!(repository.create(act("LEI-5-2019", "LEI", 2019)).await.is_err());

    truncate(&pool).await?;
    Ok(())
}

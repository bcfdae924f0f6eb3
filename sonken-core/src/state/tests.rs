#[cfg(test)]
mod tests {
    use crate::error::SonkenError;
    use crate::state::StateManager;
    use crate::types::{Project, ProjectStatus};

    #[tokio::test]
    async fn test_state_manager_init() {
        let manager = StateManager::new_in_memory().await.unwrap();
        // Should succeed without errors
        drop(manager);
    }

    #[tokio::test]
    async fn test_insert_and_get_project() {
        let manager = StateManager::new_in_memory().await.unwrap();

        let project = Project::new("proj-1", "shop", "/srv/shop")
            .with_database("shop_db", Some("shop"), Some("secret"))
            .with_status(ProjectStatus::Running);
        manager.insert_project(&project).await.unwrap();

        let retrieved = manager.get_project("proj-1").await.unwrap();
        assert_eq!(retrieved.name, "shop");
        assert_eq!(retrieved.status, ProjectStatus::Running);
        assert_eq!(retrieved.database_name.as_deref(), Some("shop_db"));
        assert_eq!(retrieved.database_user.as_deref(), Some("shop"));
        assert_eq!(retrieved.php_version, "8.2");
    }

    #[tokio::test]
    async fn test_get_missing_project() {
        let manager = StateManager::new_in_memory().await.unwrap();

        let err = manager.get_project("nope").await.unwrap_err();
        assert!(matches!(err, SonkenError::ProjectNotFound { .. }));
        assert!(manager.find_project("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_projects_by_status() {
        let manager = StateManager::new_in_memory().await.unwrap();

        manager
            .insert_project(&Project::new("a", "a", "/a").with_status(ProjectStatus::Running))
            .await
            .unwrap();
        manager.insert_project(&Project::new("b", "b", "/b")).await.unwrap();
        manager
            .insert_project(&Project::new("c", "c", "/c").with_status(ProjectStatus::Running))
            .await
            .unwrap();

        let running = manager.list_projects_by_status(ProjectStatus::Running).await.unwrap();
        let mut ids: Vec<_> = running.iter().map(|p| p.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);

        assert_eq!(manager.list_projects().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_project_status() {
        let manager = StateManager::new_in_memory().await.unwrap();
        manager.insert_project(&Project::new("a", "a", "/a")).await.unwrap();

        manager.update_project_status("a", ProjectStatus::Running).await.unwrap();
        assert_eq!(manager.get_project("a").await.unwrap().status, ProjectStatus::Running);

        let err = manager.update_project_status("zzz", ProjectStatus::Running).await.unwrap_err();
        assert!(matches!(err, SonkenError::ProjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_project_cascades_metrics() {
        let manager = StateManager::new_in_memory().await.unwrap();
        manager.insert_project(&Project::new("a", "a", "/a")).await.unwrap();

        sqlx::query(
            "INSERT INTO resource_metrics (project_id, cpu_usage, memory_usage, disk_usage) VALUES ('a', 1, 2, 3)",
        )
        .execute(manager.pool())
        .await
        .unwrap();

        manager.delete_project("a").await.unwrap();

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resource_metrics")
            .fetch_one(manager.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_timestamp_column_defaults_to_now() {
        let manager = StateManager::new_in_memory().await.unwrap();
        manager.insert_project(&Project::new("a", "a", "/a")).await.unwrap();

        let before = chrono::Utc::now().timestamp_millis() - 5_000;
        sqlx::query(
            "INSERT INTO slow_queries (project_id, query, execution_time) VALUES ('a', 'SELECT 1', 5)",
        )
        .execute(manager.pool())
        .await
        .unwrap();

        let ts: i64 = sqlx::query_scalar("SELECT timestamp FROM slow_queries")
            .fetch_one(manager.pool())
            .await
            .unwrap();
        assert!(ts >= before);
    }

    #[tokio::test]
    async fn test_reopen_persists_and_skips_migrations() {
        let db_path =
            std::env::temp_dir().join(format!("sonken-test-{}.db", uuid::Uuid::new_v4()));

        {
            let manager = StateManager::new(&db_path).await.unwrap();
            manager.insert_project(&Project::new("a", "a", "/a")).await.unwrap();
            manager.close().await;
        }

        {
            let manager = StateManager::new(&db_path).await.unwrap();
            assert_eq!(manager.list_projects().await.unwrap().len(), 1);
            manager.close().await;
        }

        let _ = std::fs::remove_file(&db_path);
    }
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置设置测试模块
///
/// 验证 config/default.toml 与环境变量的分层加载

#[cfg(test)]
mod tests {
    use crawlmesh::config::settings::Settings;
    use crawlmesh::queue::backend::BackendKind;

    #[test]
    fn test_config_loading_with_env_overrides() {
        std::env::set_var("CRAWLMESH__CRAWL__MAX_DEPTH", "7");
        std::env::set_var("CRAWLMESH__FRONTIER__BACKEND", "memory");
        std::env::set_var("CRAWLMESH__FETCH__INCLUDE_SELECTORS", "article,main");

        let settings = Settings::new();

        std::env::remove_var("CRAWLMESH__CRAWL__MAX_DEPTH");
        std::env::remove_var("CRAWLMESH__FRONTIER__BACKEND");
        std::env::remove_var("CRAWLMESH__FETCH__INCLUDE_SELECTORS");

        let settings = settings.expect("settings should load");
        assert_eq!(settings.crawl.max_depth, 7);
        assert_eq!(settings.backend_kind().unwrap(), BackendKind::Memory);
        assert_eq!(
            settings.fetch.include_selectors,
            vec!["article".to_string(), "main".to_string()]
        );
        // untouched keys keep their file defaults
        assert_eq!(settings.frontier.group, "crawlers");
        assert!(settings.retry.max_attempts > 0);
    }
}

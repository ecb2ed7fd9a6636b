use algo_app::config::{
    default_solution_sources, parse_solution_sources, Config, DatabaseConfig, LoggingConfig,
    ServerConfig, SolutionConfig,
};
use algo_app::solutions::{SolutionService, SolutionSource};
use algo_app::{Database, Language};

fn config_with_sources(raw: &str) -> Config {
    Config {
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            seed_path: None,
        },
        server: ServerConfig {
            port: 8080,
            host: "127.0.0.1".to_string(),
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            file_enabled: false,
            console_enabled: true,
            log_directory: "logs".to_string(),
        },
        solutions: SolutionConfig {
            sources: parse_solution_sources(raw).unwrap(),
            timeout_secs: 5,
        },
    }
}

#[test]
fn test_solution_source_overrides() {
    let config = config_with_sources(
        "Kotlin=https://raw.example.org/kotlin/{slug}.kt;Swift=https://example.org/blob/main/{slug}.swift",
    );
    assert!(config.validate().is_ok());

    let languages: Vec<&str> = config
        .solutions
        .sources
        .iter()
        .map(|source| source.language.as_str())
        .collect();
    assert_eq!(languages, vec!["Kotlin", "Swift"]);
}

#[test]
fn test_template_without_slug_is_rejected() {
    let config = config_with_sources("Kotlin=https://raw.example.org/kotlin/solution.kt");
    let error = config.validate().unwrap_err();
    assert!(error.to_string().contains("Kotlin"));
}

#[test]
fn test_unknown_log_level_only_warns() {
    let mut config = config_with_sources("");
    config.logging.level = "verbose".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_default_sources_build_language_urls() {
    let sources = default_solution_sources("https://github.com/acme/solutions/blob/master");
    let cpp = sources
        .iter()
        .find(|source| source.language == Language::new("C++"))
        .unwrap();
    assert_eq!(
        cpp.url_template,
        "https://github.com/acme/solutions/blob/master/CPP/{slug}.cpp"
    );
}

#[tokio::test]
async fn test_solution_service_from_config() {
    let config = config_with_sources(
        "Python=https://raw.example.org/python/{slug}.py;Java=https://example.org/blob/main/{slug}.java",
    );
    let db = Database::new(&config.database.url).await.unwrap();
    let service = SolutionService::from_config(db, &config.solutions).unwrap();

    let sources: Vec<&SolutionSource> = service.sources().iter().collect();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].language, Language::new("Python"));

    let question = algo_app::Question {
        id: 1,
        title: "Longest Palindromic Substring".to_string(),
        body: String::new(),
        difficulty: algo_app::Difficulty::Medium,
        tags: Default::default(),
        companies: Default::default(),
        solved: false,
        saved: false,
        top_liked: false,
        top_interviewed: false,
    };
    assert_eq!(
        sources[0].url_for(&question),
        "https://raw.example.org/python/longest-palindromic-substring.py"
    );
}

//! cpv Core Integration Tests

use cpv_core::{
    Error,
    api::codes::{self, ListCodesRequest, SearchCodesRequest},
    domain::taxonomy::{Language, Localized, NewCode, SearchResult, TaxonomyService},
    storage::Database,
};

fn label(de: &str, fr: &str, it: &str, en: &str) -> Localized {
    Localized::default()
        .with(Language::De, de)
        .with(Language::Fr, fr)
        .with(Language::It, it)
        .with(Language::En, en)
}

async fn taxonomy() -> TaxonomyService {
    let db = Database::in_memory()
        .await
        .expect("Failed to create test database");
    let service = TaxonomyService::from_pool(db.pool().clone());

    // children listed before their parents on purpose
    service
        .import(vec![
            NewCode::new(
                "03419000",
                label("Nutzholz", "Bois d'œuvre", "Legname", "Timber"),
                Some("03410000"),
            ),
            NewCode::new(
                "03410000",
                label("Holz", "Bois", "Legno", "Wood"),
                Some("03400000"),
            ),
            NewCode::new(
                "03400000",
                label(
                    "Forstwirtschaftliche Erzeugnisse",
                    "Produits de la sylviculture",
                    "Prodotti della silvicoltura",
                    "Forestry and logging products",
                ),
                Some("03000000"),
            ),
            NewCode::new(
                "03000000",
                label(
                    "Landwirtschaftliche Erzeugnisse",
                    "Produits agricoles",
                    "Prodotti agricoli",
                    "Agricultural products",
                ),
                None,
            ),
            NewCode::new(
                "45000000",
                label("Bauarbeiten", "Travaux de construction", "Lavori di costruzione", "Construction work"),
                None,
            ),
            NewCode::new(
                "45200000",
                label(
                    "Komplett- oder Teilbauleistungen im Hochbau",
                    "Travaux de construction complète ou partielle",
                    "Lavori per la costruzione completa o parziale",
                    "Works for complete or part construction",
                ),
                Some("45000000"),
            ),
        ])
        .await
        .expect("Failed to import fixture");
    service
}

fn code_list(nodes: &[SearchResult]) -> Vec<&str> {
    nodes.iter().map(|n| n.code.as_str()).collect()
}

fn total(forest: &[SearchResult]) -> usize {
    forest.iter().map(SearchResult::subtree_len).sum()
}

/// Every node's parent is its enclosing node; roots have no parent in the forest
fn assert_rooted(forest: &[SearchResult]) {
    let mut stack: Vec<&SearchResult> = forest.iter().collect();
    while let Some(node) = stack.pop() {
        for child in &node.children {
            assert_eq!(child.parent_code.as_deref(), Some(node.code.as_str()));
            stack.push(child);
        }
    }
}

#[tokio::test]
async fn test_deep_match_brings_whole_ancestry() {
    let service = taxonomy().await;

    let forest = service.search("nutzholz", Some(Language::De)).await.unwrap();
    assert_eq!(code_list(&forest), vec!["03000000"]);
    assert_eq!(total(&forest), 4);
    assert_rooted(&forest);

    let leaf = forest[0].find("03419000").unwrap();
    assert_eq!(leaf.label.get(Language::De), Some("Nutzholz"));
    assert!(leaf.children.is_empty());
}

#[tokio::test]
async fn test_matches_in_separate_branches_form_separate_roots() {
    let service = taxonomy().await;

    let forest = service.search("timber or construction", Some(Language::En)).await.unwrap();
    assert_eq!(code_list(&forest), vec!["03000000", "45000000"]);
    assert_rooted(&forest);
    assert_eq!(code_list(&forest[1].children), vec!["45200000"]);
}

#[tokio::test]
async fn test_cross_language_search_reads_every_field() {
    let service = taxonomy().await;

    for query in ["legname", "nutzholz", "timber", "bois"] {
        let forest = service.search(query, None).await.unwrap();
        assert!(
            forest[0].find("03419000").is_some(),
            "{} should reach the timber code",
            query
        );
    }
}

#[tokio::test]
async fn test_language_hint_excludes_other_fields() {
    let service = taxonomy().await;

    assert!(service.search("legname", Some(Language::De)).await.unwrap().is_empty());
    assert!(!service.search("legname", Some(Language::It)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_phrases_and_negation() {
    let service = taxonomy().await;

    let forest = service
        .search(r#""construction work""#, Some(Language::En))
        .await
        .unwrap();
    assert_eq!(total(&forest), 1);

    let forest = service
        .search("construction -complete", Some(Language::En))
        .await
        .unwrap();
    assert_eq!(code_list(&forest), vec!["45000000"]);
    assert!(forest[0].children.is_empty());
}

#[tokio::test]
async fn test_queries_that_cannot_match_return_nothing() {
    let service = taxonomy().await;

    for (query, language) in [
        ("", None),
        ("   ", Some(Language::Fr)),
        ("der und die", Some(Language::De)),
        ("-holz", None),
        ("zeppelin", None),
    ] {
        let forest = service.search(query, language).await.unwrap();
        assert!(forest.is_empty(), "{:?} should match nothing", query);
    }
}

#[tokio::test]
async fn test_localized_search_matches_other_word_forms() {
    let service = taxonomy().await;

    for (query, language) in [
        ("nutzhölzer", Language::De),
        ("constructions", Language::Fr),
        ("prodotto agricolo", Language::It),
        ("construction works", Language::En),
    ] {
        let forest = service.search(query, Some(language)).await.unwrap();
        assert!(!forest.is_empty(), "{} should match in {}", query, language);
        assert_rooted(&forest);
    }
}

#[tokio::test]
async fn test_decomposed_labels_are_stored_composed() {
    let service = taxonomy().await;
    service
        .import(vec![NewCode::new(
            "45210000",
            Localized::default().with(Language::De, "Geba\u{308}ude"),
            Some("45000000"),
        )])
        .await
        .unwrap();

    let children = service.list_children(Some("45000000")).await.unwrap();
    let building = children.iter().find(|c| c.code == "45210000").unwrap();
    assert_eq!(building.label.get(Language::De), Some("Gebäude"));

    let forest = service.search("gebäude", Some(Language::De)).await.unwrap();
    assert!(forest[0].find("45210000").is_some());
}

#[tokio::test]
async fn test_search_after_move_follows_new_parent() {
    let service = taxonomy().await;

    service.move_code("03410000", Some("45000000")).await.unwrap();

    let forest = service.search("timber", Some(Language::En)).await.unwrap();
    assert_eq!(code_list(&forest), vec!["45000000"]);
    assert_eq!(code_list(&forest[0].children), vec!["03410000"]);
    assert_eq!(code_list(&forest[0].children[0].children), vec!["03419000"]);
}

#[tokio::test]
async fn test_api_layer_validates_requests() {
    let service = taxonomy().await;

    let err = codes::search(&service, &SearchCodesRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));
    assert_eq!(err.code(), "E400");

    let err = codes::search(&service, &SearchCodesRequest::new("holz", Some("rm")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));

    let err = codes::list(
        &service,
        &ListCodesRequest {
            parent: Some("99999999".to_string()),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::CodeNotFound(_)));
}

#[tokio::test]
async fn test_browsing_walks_one_level_at_a_time() {
    let service = taxonomy().await;

    let mut parent: Option<String> = None;
    let mut depth = 0;
    loop {
        let children = service.list_children(parent.as_deref()).await.unwrap();
        let Some(first) = children.first() else { break };
        depth += 1;
        if !first.has_children {
            break;
        }
        parent = Some(first.code.clone());
    }
    assert_eq!(depth, 4);
}

//! End-to-end pin runs against an in-memory registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use relimg_core::{RelimgConfig, RelimgError};
use relimg_runtime::{
    Extractor, ImageReference, InspectError, Location, ManifestDocument, Pipeline,
    RegistryInspector, RelatedImageEntry, RewriteMapping, Rewriter,
};
use tokio_util::sync::CancellationToken;

const MEMCACHED: &str = "sha256:1111111111111111111111111111111111111111111111111111111111111111";
const OPERATOR: &str = "sha256:2222222222222222222222222222222222222222222222222222222222222222";
const PROXY: &str = "sha256:3333333333333333333333333333333333333333333333333333333333333333";

struct FakeRegistry {
    digests: HashMap<String, String>,
    calls: AtomicUsize,
}

impl FakeRegistry {
    fn new(entries: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            digests: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RegistryInspector for FakeRegistry {
    async fn inspect(
        &self,
        registry: &str,
        repository: &str,
        tag: &str,
    ) -> Result<String, InspectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = format!("{registry}/{repository}:{tag}");
        self.digests
            .get(&key)
            .cloned()
            .ok_or(InspectError::NotFound(key))
    }
}

const CSV: &str = r#"
apiVersion: operators.coreos.com/v1alpha1
kind: ClusterServiceVersion
metadata:
  name: memcached-operator.v0.0.1
spec:
  install:
    spec:
      deployments:
        - name: memcached-operator
          spec:
            template:
              spec:
                containers:
                  - name: manager
                    image: quay.io/example/memcached-operator:v0.0.1
                    env:
                      - name: RELATED_IMAGE_MEMCACHED
                        value: docker.io/memcached:1.4.36-alpine
                  - name: memcached
                    image: docker.io/memcached:1.4.36-alpine
                  - name: proxy
                    image: quay.io/example/proxy:v2
  relatedImages:
    - name: curated-tool
      image: quay.io/curated/tool@sha256:4444444444444444444444444444444444444444444444444444444444444444
"#;

fn containers() -> Location {
    Location::from_keys(["spec", "install", "spec", "deployments"])
        .index(0)
        .key("spec")
        .key("template")
        .key("spec")
        .key("containers")
}

fn related_images(doc: &ManifestDocument) -> Vec<RelatedImageEntry> {
    let list = doc
        .get(&Location::from_keys(["spec", "relatedImages"]))
        .cloned()
        .unwrap_or(serde_yaml::Value::Null);
    serde_yaml::from_value(list).unwrap_or_default()
}

fn full_registry() -> Arc<FakeRegistry> {
    FakeRegistry::new(&[
        ("docker.io/memcached:1.4.36-alpine", MEMCACHED),
        ("quay.io/example/memcached-operator:v0.0.1", OPERATOR),
        ("quay.io/example/proxy:v2", PROXY),
    ])
}

fn partial_registry() -> Arc<FakeRegistry> {
    FakeRegistry::new(&[
        ("docker.io/memcached:1.4.36-alpine", MEMCACHED),
        ("quay.io/example/memcached-operator:v0.0.1", OPERATOR),
    ])
}

async fn run(config: RelimgConfig, registry: Arc<FakeRegistry>) -> relimg_runtime::PinOutcome {
    let doc = ManifestDocument::from_yaml_str(CSV).unwrap();
    Pipeline::new(config, registry)
        .run(&doc, &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_env_and_container_pinned_to_same_digest() {
    let registry = full_registry();
    let outcome = run(RelimgConfig::default(), Arc::clone(&registry)).await;
    assert!(outcome.applied);
    assert!(outcome.is_complete());

    let pinned = format!("docker.io/memcached@{MEMCACHED}");
    let doc = &outcome.document;
    assert_eq!(
        doc.get_str(&containers().index(0).key("env").index(0).key("value")),
        Some(pinned.as_str())
    );
    assert_eq!(
        doc.get_str(&containers().index(1).key("image")),
        Some(pinned.as_str())
    );

    // Three distinct references, one lookup each
    assert_eq!(registry.calls.load(Ordering::SeqCst), 3);

    let entries = related_images(doc);
    assert!(entries.contains(&RelatedImageEntry {
        name: "memcached-1.4.36".to_string(),
        image: pinned,
    }));
    assert!(outcome.annotated);
    assert_eq!(
        doc.get_str(&Location::from_keys([
            "metadata",
            "annotations",
            "features.operators.openshift.io/disconnected"
        ])),
        Some("true")
    );
}

#[tokio::test]
async fn test_related_images_follow_discovery_order() {
    let outcome = run(RelimgConfig::default(), full_registry()).await;
    let names: Vec<_> = related_images(&outcome.document)
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(
        names,
        vec![
            "curated-tool",
            "memcached-operator-v0.0.1",
            "memcached-1.4.36",
            "proxy-v2"
        ]
    );
}

#[tokio::test]
async fn test_name_collision_gets_suffix() {
    let yaml = format!(
        "spec:\n  a:\n    image: quay.io/one/app@{OPERATOR}\n  b:\n    image: ghcr.io/two/app@{PROXY}\n"
    );
    let doc = ManifestDocument::from_yaml_str(&yaml).unwrap();
    let outcome = Pipeline::new(RelimgConfig::default(), FakeRegistry::new(&[]))
        .run(&doc, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        related_images(&outcome.document),
        vec![
            RelatedImageEntry {
                name: "app".to_string(),
                image: format!("quay.io/one/app@{OPERATOR}"),
            },
            RelatedImageEntry {
                name: "app-2".to_string(),
                image: format!("ghcr.io/two/app@{PROXY}"),
            },
        ]
    );
}

#[tokio::test]
async fn test_unresolved_reference_blocks_output() {
    let outcome = run(RelimgConfig::default(), partial_registry()).await;
    let input = ManifestDocument::from_yaml_str(CSV).unwrap();

    assert!(!outcome.applied);
    assert!(!outcome.has_changes(&input));
    assert_eq!(outcome.document, input);

    assert_eq!(outcome.resolved.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(
        outcome.failures[0].reference,
        ImageReference::parse("quay.io/example/proxy:v2").unwrap()
    );
    assert!(matches!(
        outcome.failures[0].cause,
        InspectError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_allow_partial_applies_resolvable_subset() {
    let config = RelimgConfig {
        allow_partial: true,
        ..Default::default()
    };
    let outcome = run(config, partial_registry()).await;
    let doc = &outcome.document;

    assert!(outcome.applied);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(
        doc.get_str(&containers().index(0).key("image")),
        Some(format!("quay.io/example/memcached-operator@{OPERATOR}").as_str())
    );
    assert_eq!(
        doc.get_str(&containers().index(2).key("image")),
        Some("quay.io/example/proxy:v2")
    );

    let images: Vec<_> = related_images(doc).into_iter().map(|e| e.image).collect();
    assert!(images.contains(&format!("docker.io/memcached@{MEMCACHED}")));
    assert!(!images.iter().any(|i| i.contains("proxy")));
}

#[tokio::test]
async fn test_curated_entry_preserved() {
    let outcome = run(RelimgConfig::default(), full_registry()).await;
    let entries = related_images(&outcome.document);
    assert_eq!(
        entries[0],
        RelatedImageEntry {
            name: "curated-tool".to_string(),
            image: "quay.io/curated/tool@sha256:4444444444444444444444444444444444444444444444444444444444444444".to_string(),
        }
    );
    // The curated list is not itself treated as discovered images
    assert!(outcome
        .occurrences
        .iter()
        .all(|o| !o.raw.contains("curated")));
}

#[tokio::test]
async fn test_second_run_is_stable() {
    let registry = full_registry();
    let first = run(RelimgConfig::default(), Arc::clone(&registry)).await;

    let second = Pipeline::new(RelimgConfig::default(), registry)
        .run(&first.document, &CancellationToken::new())
        .await
        .unwrap();
    assert!(second.applied);
    assert!(second.resolved.is_empty());
    assert!(!second.annotated);
    assert_eq!(second.document, first.document);
}

#[tokio::test]
async fn test_extraction_warning_does_not_block() {
    let yaml = "spec:\n  containers:\n    - image: \"${OPERATOR_IMAGE}\"\n    - image: docker.io/memcached:1.4.36-alpine\n";
    let doc = ManifestDocument::from_yaml_str(yaml).unwrap();
    let outcome = Pipeline::new(RelimgConfig::default(), full_registry())
        .run(&doc, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.applied);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].raw, "${OPERATOR_IMAGE}");
    assert_eq!(
        outcome
            .document
            .get_str(&Location::from_keys(["spec", "containers"]).index(0).key("image")),
        Some("${OPERATOR_IMAGE}")
    );
}

#[tokio::test]
async fn test_cancelled_run_is_an_error() {
    let doc = ManifestDocument::from_yaml_str(CSV).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = Pipeline::new(RelimgConfig::default(), full_registry())
        .run(&doc, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RelimgError::Cancelled(_)));
}

#[test]
fn test_rewrite_round_trip_properties() {
    let doc = ManifestDocument::from_yaml_str(CSV).unwrap();
    let (occurrences, _) = Extractor::default().extract(&doc);
    let mapping = RewriteMapping::from_pairs(
        occurrences
            .iter()
            .filter(|o| o.reference.is_tag_form())
            .map(|o| (o.reference.clone(), o.reference.with_digest(MEMCACHED))),
    )
    .unwrap();

    let rewriter = Rewriter::default();
    let once = rewriter.rewrite(&doc, &mapping).unwrap();
    assert_ne!(once, doc);
    assert_eq!(rewriter.rewrite(&once, &mapping).unwrap(), once);

    let (after, _) = Extractor::default().extract(&once);
    assert_eq!(after.len(), occurrences.len());
    assert!(after.iter().all(|o| o.reference.is_digest_form()));
}

#[tokio::test]
async fn test_docker_hub_spellings_share_one_entry() {
    let yaml = "spec:\n  a:\n    image: docker.io/memcached:1.4.36-alpine\n  b:\n    image: memcached:1.4.36-alpine\n";
    let doc = ManifestDocument::from_yaml_str(yaml).unwrap();
    let registry = FakeRegistry::new(&[("docker.io/memcached:1.4.36-alpine", MEMCACHED)]);
    let outcome = Pipeline::new(RelimgConfig::default(), Arc::<FakeRegistry>::clone(&registry))
        .run(&doc, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(registry.calls.load(Ordering::SeqCst), 1);
    // Each spelling is kept as written
    assert_eq!(
        outcome
            .document
            .get_str(&Location::from_keys(["spec", "b", "image"])),
        Some(format!("docker.io/library/memcached@{MEMCACHED}").as_str())
    );
    assert_eq!(
        related_images(&outcome.document),
        vec![RelatedImageEntry {
            name: "memcached-1.4.36".to_string(),
            image: format!("docker.io/memcached@{MEMCACHED}"),
        }]
    );
}

#[tokio::test]
async fn test_partial_entry_name_matches_its_digest() {
    let yaml = "spec:\n  a:\n    image: quay.io/org/app:v1\n  b:\n    image: quay.io/org/app:v2\n";
    let doc = ManifestDocument::from_yaml_str(yaml).unwrap();
    let config = RelimgConfig {
        allow_partial: true,
        ..Default::default()
    };
    let outcome = Pipeline::new(config, FakeRegistry::new(&[("quay.io/org/app:v2", PROXY)]))
        .run(&doc, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.applied);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(
        related_images(&outcome.document),
        vec![RelatedImageEntry {
            name: "app-v2".to_string(),
            image: format!("quay.io/org/app@{PROXY}"),
        }]
    );
}

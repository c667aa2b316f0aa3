//! End-to-end reconcile scenarios against the in-memory store.

mod common;

use kube::api::ObjectMeta;
use kube::ResourceExt;
use submarine_operator::error::OperatorError;
use submarine_operator::events::EventSeverity;
use submarine_operator::queue::Intent;
use submarine_operator::store::ObjectStore;

use common::{example_submarine, Harness};

const KEY: &str = "default/ex";

fn assert_controlled(meta: &ObjectMeta, parent_uid: &str, what: &str) {
    let controlled = meta
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|r| r.controller == Some(true) && r.kind == "Submarine" && r.uid == parent_uid);
    assert!(controlled, "{what} is not controlled by the parent");
}

#[tokio::test]
async fn first_apply_creates_all_children_with_ownership() {
    let harness = Harness::new();
    let parent = harness.seed_submarine(example_submarine()).await;
    let uid = parent.metadata.uid.as_deref().expect("seeded uid");

    harness.reconcile(KEY, Intent::Add).await.expect("first apply");

    // The full managed-child set.
    let deployments = harness.deployments.snapshot();
    let mut deployment_names: Vec<_> = deployments
        .iter()
        .map(|d| d.name_any())
        .collect();
    deployment_names.sort();
    assert_eq!(
        deployment_names,
        vec![
            "submarine-database",
            "submarine-server",
            "submarine-tensorboard"
        ]
    );

    let mut service_names: Vec<_> = harness
        .services
        .snapshot()
        .iter()
        .map(|s| s.name_any())
        .collect();
    service_names.sort();
    assert_eq!(
        service_names,
        vec![
            "submarine-database",
            "submarine-server",
            "submarine-tensorboard-service"
        ]
    );

    let mut pv_names: Vec<_> = harness
        .persistent_volumes
        .snapshot()
        .iter()
        .map(|pv| pv.name_any())
        .collect();
    pv_names.sort();
    assert_eq!(
        pv_names,
        vec![
            "submarine-database-pv--default",
            "submarine-tensorboard-pv--default"
        ]
    );

    let mut pvc_names: Vec<_> = harness
        .persistent_volume_claims
        .snapshot()
        .iter()
        .map(|pvc| pvc.name_any())
        .collect();
    pvc_names.sort();
    assert_eq!(
        pvc_names,
        vec!["submarine-database-pvc", "submarine-tensorboard-pvc"]
    );

    assert_eq!(harness.service_accounts.snapshot().len(), 1);
    assert_eq!(harness.ingresses.snapshot().len(), 1);
    assert_eq!(harness.ingress_routes.snapshot().len(), 1);
    assert_eq!(harness.cluster_roles.snapshot().len(), 1);
    assert_eq!(harness.cluster_role_bindings.snapshot().len(), 1);

    // Every child carries a controller back-reference to the parent.
    for d in &deployments {
        assert_controlled(&d.metadata, uid, "deployment");
    }
    for s in harness.services.snapshot() {
        assert_controlled(&s.metadata, uid, "service");
    }
    for sa in harness.service_accounts.snapshot() {
        assert_controlled(&sa.metadata, uid, "serviceaccount");
    }
    for pv in harness.persistent_volumes.snapshot() {
        assert_controlled(&pv.metadata, uid, "persistentvolume");
    }
    for pvc in harness.persistent_volume_claims.snapshot() {
        assert_controlled(&pvc.metadata, uid, "persistentvolumeclaim");
    }
    for ingress in harness.ingresses.snapshot() {
        assert_controlled(&ingress.metadata, uid, "ingress");
    }
    for route in harness.ingress_routes.snapshot() {
        assert_controlled(&route.metadata, uid, "ingressroute");
    }
    for role in harness.cluster_roles.snapshot() {
        assert_controlled(&role.metadata, uid, "clusterrole");
    }
    for binding in harness.cluster_role_bindings.snapshot() {
        assert_controlled(&binding.metadata, uid, "clusterrolebinding");
    }

    // All four sub-releases installed, recorded under the parent key.
    let installs = harness.charts.installs();
    let mut releases: Vec<_> = installs.iter().map(|h| h.release.clone()).collect();
    releases.sort();
    assert_eq!(
        releases,
        vec!["notebook-controller", "pytorchjob", "tfjob", "traefik"]
    );
    assert_eq!(harness.reconciler.installed_chart_handles(KEY).len(), 4);

    // Deployments report nothing yet, so the roll-up is zero.
    let parent = harness
        .submarines
        .get(Some("default"), "ex")
        .await
        .expect("parent present");
    let status = parent.status.expect("status written");
    assert_eq!(status.available_server_replicas, 0);
    assert_eq!(status.available_database_replicas, 0);

    let events = harness.recorder.events();
    assert!(events
        .iter()
        .any(|e| e.severity == EventSeverity::Normal && e.reason == "Synced"));
}

#[tokio::test]
async fn reapply_is_idempotent_and_converged() {
    let harness = Harness::new();
    harness.seed_submarine(example_submarine()).await;

    harness.reconcile(KEY, Intent::Add).await.expect("first apply");
    harness.refresh_caches().await;
    let writes_after_first = harness.child_write_count();

    // Two further reconciles: the children are already as desired, so no
    // child store sees another write.
    for _ in 0..2 {
        harness
            .reconcile(KEY, Intent::Update)
            .await
            .expect("reapply");
        harness.refresh_caches().await;
    }
    assert_eq!(harness.child_write_count(), writes_after_first);
}

#[tokio::test]
async fn status_follows_observed_deployment_availability() {
    let harness = Harness::new();
    harness.seed_submarine(example_submarine()).await;
    harness.reconcile(KEY, Intent::Add).await.expect("first apply");

    // The server deployment starts reporting one available replica, the way
    // the deployment controller would: through its status subresource.
    let mut server = harness
        .deployments
        .get(Some("default"), "submarine-server")
        .await
        .expect("server deployment");
    server.status = Some(k8s_openapi::api::apps::v1::DeploymentStatus {
        available_replicas: Some(1),
        ..Default::default()
    });
    harness
        .deployments
        .update_status(Some("default"), &server)
        .await
        .expect("status update");

    harness.refresh_caches().await;
    harness
        .reconcile(KEY, Intent::Update)
        .await
        .expect("reconcile after status change");

    let parent = harness
        .submarines
        .get(Some("default"), "ex")
        .await
        .expect("parent present");
    let status = parent.status.expect("status written");
    assert_eq!(status.available_server_replicas, 1);
    assert_eq!(status.available_database_replicas, 0);
}

#[tokio::test]
async fn external_replica_drift_is_restored() {
    let harness = Harness::new();
    harness.seed_submarine(example_submarine()).await;
    harness.reconcile(KEY, Intent::Add).await.expect("first apply");

    // An external actor scales the server deployment.
    let mut server = harness
        .deployments
        .get(Some("default"), "submarine-server")
        .await
        .expect("server deployment");
    if let Some(spec) = server.spec.as_mut() {
        spec.replicas = Some(3);
    }
    harness
        .deployments
        .update(Some("default"), &server)
        .await
        .expect("external patch");

    harness.refresh_caches().await;
    harness
        .reconcile(KEY, Intent::Update)
        .await
        .expect("drift reconcile");

    let restored = harness
        .deployments
        .get(Some("default"), "submarine-server")
        .await
        .expect("server deployment");
    assert_eq!(
        restored.spec.as_ref().and_then(|s| s.replicas),
        Some(1),
        "replicas must be restored to the parent spec"
    );
}

#[tokio::test]
async fn name_squat_fails_without_mutation() {
    let harness = Harness::new();

    // A foreign deployment occupies the managed name before the parent
    // exists.
    let squatter = k8s_openapi::api::apps::v1::Deployment {
        metadata: ObjectMeta {
            name: Some("submarine-server".to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    harness
        .deployments
        .create(Some("default"), &squatter)
        .await
        .expect("squatter created");

    harness.seed_submarine(example_submarine()).await;
    let writes_before = harness.deployments.write_count();

    let err = harness
        .reconcile(KEY, Intent::Add)
        .await
        .expect_err("squatted name must fail the reconcile");
    assert!(matches!(err, OperatorError::ResourceExists { ref name } if name == "submarine-server"));
    assert!(err.requeues(), "ownership conflicts keep retrying");

    // The squatter was not touched.
    assert_eq!(harness.deployments.write_count(), writes_before);
    let live = harness
        .deployments
        .get(Some("default"), "submarine-server")
        .await
        .expect("squatter still present");
    assert!(live.metadata.owner_references.is_none());

    let events = harness.recorder.events();
    let warning = events
        .iter()
        .find(|e| e.reason == "ErrResourceExists")
        .expect("warning event emitted");
    assert_eq!(warning.severity, EventSeverity::Warning);
    assert_eq!(
        warning.message,
        "Resource \"submarine-server\" already exists and is not managed by Submarine"
    );
}

#[tokio::test]
async fn invalid_storage_type_skips_volumes_but_succeeds() {
    let harness = Harness::new();
    let mut parent = example_submarine();
    parent.spec.storage.storage_type = "foo".to_string();
    harness.seed_submarine(parent).await;

    harness
        .reconcile(KEY, Intent::Add)
        .await
        .expect("invalid storage type is not an error");

    assert!(harness.persistent_volumes.snapshot().is_empty());
    assert!(harness.persistent_volume_claims.snapshot().is_empty());
    assert!(harness.ingress_routes.snapshot().is_empty());

    // Database and tensorboard workloads are skipped with their volumes.
    let deployment_names: Vec<_> = harness
        .deployments
        .snapshot()
        .iter()
        .map(|d| d.name_any())
        .collect();
    assert_eq!(deployment_names, vec!["submarine-server"]);

    // Everything that does not depend on storage still exists.
    assert_eq!(harness.ingresses.snapshot().len(), 1);
    assert_eq!(harness.cluster_roles.snapshot().len(), 1);
    assert_eq!(harness.cluster_role_bindings.snapshot().len(), 1);
}

#[tokio::test]
async fn delete_uninstalls_each_chart_exactly_once() {
    let harness = Harness::new();
    harness.seed_submarine(example_submarine()).await;
    harness.reconcile(KEY, Intent::Add).await.expect("first apply");
    assert_eq!(harness.reconciler.installed_chart_handles(KEY).len(), 4);

    harness
        .reconcile(KEY, Intent::Delete)
        .await
        .expect("delete branch");

    let mut uninstalled: Vec<_> = harness
        .charts
        .uninstalls()
        .iter()
        .map(|h| h.release.clone())
        .collect();
    uninstalled.sort();
    assert_eq!(
        uninstalled,
        vec!["notebook-controller", "pytorchjob", "tfjob", "traefik"]
    );
    assert!(harness.reconciler.installed_chart_handles(KEY).is_empty());

    // A second delete finds nothing left to uninstall.
    harness
        .reconcile(KEY, Intent::Delete)
        .await
        .expect("second delete");
    assert_eq!(harness.charts.uninstalls().len(), 4);
}

#[tokio::test]
async fn missing_parent_is_a_no_op() {
    let harness = Harness::new();
    harness
        .reconcile("default/ghost", Intent::Update)
        .await
        .expect("missing parent is success");
    assert!(harness.deployments.snapshot().is_empty());
    assert!(harness.recorder.events().is_empty());
}

#[tokio::test]
async fn two_parents_keep_separate_chart_registries() {
    let harness = Harness::new();
    harness.seed_submarine(example_submarine()).await;

    let mut other = example_submarine();
    other.metadata.name = Some("other".to_string());
    other.metadata.namespace = Some("team-b".to_string());
    harness.seed_submarine(other).await;

    harness.reconcile(KEY, Intent::Add).await.expect("first parent");
    harness.refresh_caches().await;

    // The second parent trips over the cluster-scoped RBAC objects owned by
    // the first one, but its sub-charts were already installed and recorded
    // under its own key.
    let err = harness
        .reconcile("team-b/other", Intent::Add)
        .await
        .expect_err("cluster-scoped names collide across parents");
    assert!(matches!(err, OperatorError::ResourceExists { .. }));

    // Deleting one parent leaves the other's releases installed.
    harness
        .reconcile(KEY, Intent::Delete)
        .await
        .expect("delete first parent");
    assert_eq!(harness.charts.uninstalls().len(), 4);
    assert_eq!(
        harness
            .reconciler
            .installed_chart_handles("team-b/other")
            .len(),
        4
    );
}

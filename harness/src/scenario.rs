// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

//! Install, verify and tear down one operator.

use log::{info, warn};
use olm_crds::phases::CSV_SUCCEEDED;
use olm_crds::{Approval, InstallModeType};

use crate::check::Check;
use crate::context::TestContext;
use crate::error::{Error, Result};
use crate::poll::Expected;
use crate::resources::csv::Csv;
use crate::resources::{
    CustomResource, OperatorGroup, PackageManifestSnapshot, Project, Subscription, TargetScope,
    jsonpath, object_query,
};
use crate::template::{Params, Template};

/// Namespace a SingleNamespace install watches unless told otherwise.
pub const DEFAULT_WATCH_NAMESPACE: &str = "default";

/// An operand to create once the operator runs, and the status it must reach.
#[derive(Clone, Debug)]
pub struct CustomResourceCheck {
    pub kind: String,
    pub name: String,
    pub template: Template,
    pub params: Params,
    /// JSONPath evaluated against the operand.
    pub status_path: String,
    pub expected: Expected,
}

/// How to install one operator package.
#[derive(Clone, Debug)]
pub struct OperatorProfile {
    pub package: String,
    /// Defaults to the package's default channel.
    pub channel: Option<String>,
    pub approval: Approval,
    /// Overrides the catalog the package manifest points at.
    pub source: Option<String>,
    pub source_namespace: Option<String>,
    pub starting_csv: Option<String>,
    /// Overrides the install mode picked from the package manifest.
    pub install_mode: Option<InstallModeType>,
    pub watch_namespace: Option<String>,
    /// Create the test namespace as a project first.
    pub create_namespace: bool,
    pub custom_resource: Option<CustomResourceCheck>,
}

impl OperatorProfile {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            channel: None,
            approval: Approval::Automatic,
            source: None,
            source_namespace: None,
            starting_csv: None,
            install_mode: None,
            watch_namespace: None,
            create_namespace: true,
            custom_resource: None,
        }
    }
}

/// What [`install_operator`] set up.
#[derive(Clone, Debug)]
pub struct Installation {
    pub snapshot: PackageManifestSnapshot,
    pub install_mode: InstallModeType,
    pub subscription: Subscription,
}

impl Installation {
    /// Namespace the operator runs in.
    pub fn namespace(&self) -> &str {
        &self.subscription.namespace
    }

    pub fn installed_csv(&self) -> Result<&str> {
        self.subscription
            .installed_csv
            .as_deref()
            .ok_or_else(|| Error::UnexpectedOutput {
                query: format!("subscription {}", self.subscription.name),
                reason: "no installed CSV recorded".to_string(),
            })
    }
}

/// Subscribe to `profile.package` and wait until its CSV is installed.
///
/// AllNamespaces installs go to the global operators namespace, which already
/// carries an OperatorGroup; other modes get their own group in the test
/// namespace.
pub async fn install_operator(
    ctx: &mut TestContext,
    profile: &OperatorProfile,
) -> Result<Installation> {
    let snapshot =
        PackageManifestSnapshot::fetch(ctx, &profile.package, profile.channel.as_deref()).await?;
    let install_mode = match profile.install_mode {
        Some(mode) if snapshot.supports(mode) => mode,
        Some(_) => {
            return Err(Error::NoInstallMode {
                package: profile.package.clone(),
            });
        }
        None => snapshot.preferred_install_mode()?,
    };
    ctx.info(format!(
        "installing {} {} from {} in {install_mode} mode",
        profile.package, snapshot.csv_version, snapshot.catalog_source
    ));

    let namespace = match install_mode {
        InstallModeType::AllNamespaces => ctx.global_namespace().to_string(),
        _ => ctx.namespace().to_string(),
    };
    if profile.create_namespace {
        Project::new(ctx.namespace()).create_with_check(ctx).await?;
    }

    let scope = match install_mode {
        InstallModeType::OwnNamespace => Some(TargetScope::Own),
        InstallModeType::SingleNamespace => Some(TargetScope::Single(
            profile
                .watch_namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_WATCH_NAMESPACE.to_string()),
        )),
        _ => None,
    };
    if let Some(scope) = scope {
        OperatorGroup::new(format!("{}-og", profile.package), &namespace, scope)
            .create_with_check(ctx)
            .await?;
    }

    let mut subscription = Subscription::new(
        &profile.package,
        &namespace,
        &profile.package,
        &snapshot.channel,
        profile.source.as_deref().unwrap_or(&snapshot.catalog_source),
        profile
            .source_namespace
            .as_deref()
            .unwrap_or(&snapshot.catalog_namespace),
    )
    .with_approval(profile.approval);
    if let Some(csv) = &profile.starting_csv {
        subscription = subscription.with_starting_csv(csv);
    }
    subscription.create(ctx).await?;
    if profile.approval == Approval::Manual {
        subscription.approve(ctx).await?;
    }

    Ok(Installation {
        snapshot,
        install_mode,
        subscription,
    })
}

/// Wait for the installed CSV to report `Succeeded`.
pub async fn verify_csv(ctx: &TestContext, installation: &Installation) -> Result<()> {
    let csv = installation.installed_csv()?;
    Check::equals(
        object_query(
            Csv::KIND,
            csv,
            installation.namespace(),
            [jsonpath("{.status.phase}").as_str()],
        ),
        CSV_SUCCEEDED,
    )
    .check_without_assert(ctx.exec())
    .await?;
    ctx.info(format!("{csv} succeeded"));
    Ok(())
}

/// Create the operand in the test namespace and wait for it to become ready.
pub async fn verify_custom_resource(
    ctx: &mut TestContext,
    installation: &Installation,
    check: &CustomResourceCheck,
) -> Result<()> {
    let resource = CustomResource::new(
        &check.kind,
        &check.name,
        ctx.namespace(),
        check.template.clone(),
    )
    .with_params(check.params.clone());
    resource.create(ctx, installation.namespace()).await?;
    resource
        .check_status(ctx, &check.status_path, check.expected.clone())
        .await
}

/// Delete everything the test case created.
pub async fn teardown(ctx: &mut TestContext, check_deletion: bool) -> Result<()> {
    ctx.cleanup(check_deletion).await
}

/// Install and verify, leaving everything in place.
pub async fn install_and_verify(
    ctx: &mut TestContext,
    profile: &OperatorProfile,
) -> Result<Installation> {
    let installation = install_operator(ctx, profile).await?;
    verify_csv(ctx, &installation).await?;
    if let Some(check) = &profile.custom_resource {
        verify_custom_resource(ctx, &installation, check).await?;
    }
    Ok(installation)
}

/// Install, verify and tear down. A failure triggers a best-effort teardown
/// and is returned as is.
pub async fn run(ctx: &mut TestContext, profile: &OperatorProfile) -> Result<Installation> {
    match install_and_verify(ctx, profile).await {
        Ok(installation) => {
            teardown(ctx, true).await?;
            info!("{}: {} passed", ctx.test_name(), profile.package);
            Ok(installation)
        }
        Err(e) => {
            warn!("{}: {} failed: {e}", ctx.test_name(), profile.package);
            teardown(ctx, false).await?;
            Err(e)
        }
    }
}

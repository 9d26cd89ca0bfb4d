// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use std::time::Duration;

use kube::core::ObjectList;
use log::{debug, info};
use olm_crds::phases::{
    INSTALL_PLAN_COMPLETE, INSTALL_PLAN_REQUIRES_APPROVAL, SUBSCRIPTION_AT_LATEST_KNOWN,
    SUBSCRIPTION_UPGRADE_FAILED, SUBSCRIPTION_UPGRADE_PENDING,
};
use olm_crds::{
    Approval, InstallPlan, Subscription as SubscriptionObject, SubscriptionSpec, SubscriptionStatus,
};
use serde_json::json;

use super::csv::Csv;
use super::{jsonpath, merge_patch, object_query};
use crate::context::TestContext;
use crate::error::{Error, Result};
use crate::executor::{Action, Executor};
use crate::poll::{
    Comparison, Expectation, Polarity, Primitive, Query, default_poller, expected_resource,
    get_resource, get_resource_no_empty,
};
use crate::template::{Params, Template};
use crate::timer::Poller;
use crate::tracker::{DeletionDescriptor, ResourceKey};

pub const KIND: &str = "sub";
const INSTALL_PLAN_KIND: &str = "installplan";

/// An operator Subscription and, once installed, the CSV it produced.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub name: String,
    pub namespace: String,
    /// Package to install.
    pub package: String,
    pub channel: String,
    pub approval: Approval,
    pub source: String,
    pub source_namespace: String,
    pub starting_csv: Option<String>,
    pub installed_csv: Option<String>,
    /// Fixture used instead of the typed manifest.
    template: Option<Template>,
}

impl Subscription {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        package: impl Into<String>,
        channel: impl Into<String>,
        source: impl Into<String>,
        source_namespace: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            package: package.into(),
            channel: channel.into(),
            approval: Approval::Automatic,
            source: source.into(),
            source_namespace: source_namespace.into(),
            starting_csv: None,
            installed_csv: None,
            template: None,
        }
    }

    pub fn with_approval(mut self, approval: Approval) -> Self {
        self.approval = approval;
        self
    }

    pub fn with_starting_csv(mut self, csv: impl Into<String>) -> Self {
        self.starting_csv = Some(csv.into());
        self
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.name, KIND, &self.namespace)
    }

    fn params(&self) -> Params {
        Params::from([
            ("SUBNAME", self.name.as_str()),
            ("SUBNAMESPACE", self.namespace.as_str()),
            ("CHANNEL", self.channel.as_str()),
            ("OPERATORNAME", self.package.as_str()),
            ("SOURCENAME", self.source.as_str()),
            ("SOURCENAMESPACE", self.source_namespace.as_str()),
            ("STARTINGCSV", self.starting_csv.as_deref().unwrap_or_default()),
        ])
        .set("APPROVAL", self.approval.to_string())
    }

    pub fn object(&self) -> SubscriptionObject {
        let spec = SubscriptionSpec {
            name: self.package.clone(),
            channel: Some(self.channel.clone()),
            source: self.source.clone(),
            source_namespace: self.source_namespace.clone(),
            install_plan_approval: Some(self.approval),
            starting_csv: self.starting_csv.clone(),
        };
        let mut sub = SubscriptionObject::new(&self.name, spec);
        sub.metadata.namespace = Some(self.namespace.clone());
        sub
    }

    /// Rendered manifest, without touching the cluster.
    pub fn manifest(&self) -> Result<String> {
        match &self.template {
            Some(template) => template.render(&self.params()),
            None => Ok(serde_yaml::to_string(&self.object())?),
        }
    }

    fn field(&self, expr: &str) -> Query {
        object_query(KIND, &self.name, &self.namespace, [jsonpath(expr).as_str()])
    }

    /// Apply the Subscription and track it, without waiting for OLM.
    pub async fn create_without_check(&self, ctx: &mut TestContext) -> Result<()> {
        match &self.template {
            Some(template) => ctx.apply(template, &self.params()).await?,
            None => ctx.apply_object("subscription", &self.object()).await?,
        };
        ctx.track(DeletionDescriptor::new(KIND, &self.name, &self.namespace));
        ctx.info(format!("created subscription {} ({})", self.name, self.approval));
        Ok(())
    }

    /// Apply the Subscription and wait for OLM to pick it up.
    ///
    /// With automatic approval this returns once the CSV is installed and
    /// tracked. With manual approval it returns once an InstallPlan is waiting,
    /// see [`Subscription::approve`].
    pub async fn create(&mut self, ctx: &mut TestContext) -> Result<()> {
        self.create_without_check(ctx).await?;
        match self.approval {
            Approval::Automatic => {
                self.wait_for_state(ctx.exec(), SUBSCRIPTION_AT_LATEST_KNOWN)
                    .await?;
                self.find_installed_csv(ctx).await?;
            }
            Approval::Manual => {
                self.wait_for_state(ctx.exec(), SUBSCRIPTION_UPGRADE_PENDING)
                    .await?;
            }
        }
        Ok(())
    }

    async fn wait_for_state(&self, exec: &dyn Executor, state: &str) -> Result<()> {
        let expectation = Expectation::new(Comparison::Exact, state, Polarity::MustHold);
        expected_resource(
            exec,
            &self.field("{.status.state}"),
            &expectation,
            &default_poller(Primitive::Expect),
        )
        .await
    }

    /// Read `installedCSV` and track the CSV for cleanup.
    pub async fn find_installed_csv(&mut self, ctx: &mut TestContext) -> Result<String> {
        let csv = get_resource_no_empty(
            ctx.exec(),
            &self.field("{.status.installedCSV}"),
            &default_poller(Primitive::Get),
        )
        .await?;
        self.record_installed_csv(ctx, csv.clone());
        Ok(csv)
    }

    fn record_installed_csv(&mut self, ctx: &mut TestContext, csv: String) {
        ctx.track(DeletionDescriptor::new(Csv::KIND, &csv, &self.namespace));
        ctx.info(format!("subscription {} installed {csv}", self.name));
        self.installed_csv = Some(csv);
    }

    /// Approve pending InstallPlans until a CSV is installed.
    ///
    /// Several plans may need approving in a row when the channel head is more
    /// than one upgrade away from the starting CSV.
    pub async fn approve(&mut self, ctx: &mut TestContext) -> Result<String> {
        let exec = ctx.exec();
        let this = &*self;
        let csv = Poller::new()
            .with_interval(Duration::from_secs(6))
            .with_timeout(Duration::from_secs(360))
            .with_error_message(format!(
                "subscription {} did not reach {SUBSCRIPTION_AT_LATEST_KNOWN}",
                self.name
            ))
            .poll_until(move || async move { this.approve_step(exec).await })
            .await?;
        self.record_installed_csv(ctx, csv.clone());
        Ok(csv)
    }

    async fn approve_step(&self, exec: &dyn Executor) -> Result<Option<String>> {
        let state = self.read(exec, "{.status.state}").await;
        match state.as_str() {
            SUBSCRIPTION_AT_LATEST_KNOWN => {
                let csv = self.read(exec, "{.status.installedCSV}").await;
                Ok((!csv.is_empty()).then_some(csv))
            }
            SUBSCRIPTION_UPGRADE_PENDING => {
                let plan = self.read(exec, "{.status.installplan.name}").await;
                if plan.is_empty() {
                    return Ok(None);
                }
                self.approve_install_plan(exec, &plan).await?;
                self.wait_for_install_plan(exec, &plan, INSTALL_PLAN_COMPLETE)
                    .await?;
                Ok(None)
            }
            SUBSCRIPTION_UPGRADE_FAILED => Err(Error::UnexpectedOutput {
                query: self.field("{.status.state}").to_string(),
                reason: format!("subscription {} failed to upgrade", self.name),
            }),
            other => {
                debug!("subscription {} is in state {other:?}", self.name);
                Ok(None)
            }
        }
    }

    /// Approve only the InstallPlan that installs `csv`, then wait for it to
    /// reach `phase`. Other pending plans are left alone.
    pub async fn approve_specific_ip(
        &self,
        ctx: &TestContext,
        csv: &str,
        phase: &str,
    ) -> Result<()> {
        let exec = ctx.exec();
        let plan = Poller::new()
            .with_interval(Duration::from_secs(3))
            .with_timeout(Duration::from_secs(240))
            .with_error_message(format!("no install plan for {csv} in {}", self.name))
            .poll_until(move || async move { self.specific_ip_step(exec, csv).await })
            .await?;
        self.wait_for_install_plan(exec, &plan, phase).await
    }

    async fn specific_ip_step(&self, exec: &dyn Executor, csv: &str) -> Result<Option<String>> {
        let state = self.read(exec, "{.status.state}").await;
        let current = self.read(exec, "{.status.currentCSV}").await;
        let plan = self.read(exec, "{.status.installplan.name}").await;
        if plan.is_empty() {
            return Ok(None);
        }
        match state.as_str() {
            SUBSCRIPTION_UPGRADE_PENDING if current.contains(csv) => {
                self.approve_install_plan(exec, &plan).await?;
                Ok(Some(plan))
            }
            SUBSCRIPTION_AT_LATEST_KNOWN if current == csv => {
                debug!("{csv} is already installed by {plan}");
                Ok(Some(plan))
            }
            _ => Ok(None),
        }
    }

    async fn approve_install_plan(&self, exec: &dyn Executor, plan: &str) -> Result<()> {
        let patch = json!({"spec": {"approved": true}}).to_string();
        object_query(
            INSTALL_PLAN_KIND,
            plan,
            &self.namespace,
            ["--type=merge", "-p", patch.as_str()],
        )
        .run(exec, Action::Patch)
        .await?;
        info!("approved install plan {plan} of {}", self.name);
        Ok(())
    }

    async fn wait_for_install_plan(&self, exec: &dyn Executor, plan: &str, phase: &str) -> Result<()> {
        let query = object_query(
            INSTALL_PLAN_KIND,
            plan,
            &self.namespace,
            [jsonpath("{.status.phase}").as_str()],
        );
        let expectation = Expectation::new(Comparison::Exact, phase, Polarity::MustHold);
        expected_resource(exec, &query, &expectation, &default_poller(Primitive::Expect)).await
    }

    /// One read inside a poll loop; failures count as empty output.
    async fn read(&self, exec: &dyn Executor, expr: &str) -> String {
        match self.field(expr).run(exec, Action::Get).await {
            Ok(output) => output,
            Err(e) => {
                debug!("reading {expr} of subscription {}: {e}", self.name);
                String::new()
            }
        }
    }

    pub async fn status(&self, ctx: &TestContext) -> Result<SubscriptionStatus> {
        let query = object_query(KIND, &self.name, &self.namespace, ["-o", "json"]);
        let output = get_resource(ctx.exec(), &query, &default_poller(Primitive::Get)).await?;
        let sub: SubscriptionObject =
            serde_json::from_str(&output).map_err(|source| Error::Decode {
                what: format!("subscription {}", self.name),
                source,
            })?;
        Ok(sub.status.unwrap_or_default())
    }

    /// InstallPlans in the namespace still waiting for approval.
    pub async fn pending_install_plans(&self, ctx: &TestContext) -> Result<Vec<InstallPlan>> {
        let query = Query::admin(["-n", self.namespace.as_str(), INSTALL_PLAN_KIND, "-o", "json"]);
        let output = get_resource(ctx.exec(), &query, &default_poller(Primitive::Get)).await?;
        let plans: ObjectList<InstallPlan> =
            serde_json::from_str(&output).map_err(|source| Error::Decode {
                what: format!("install plans in {}", self.namespace),
                source,
            })?;
        Ok(plans
            .items
            .into_iter()
            .filter(|plan| {
                plan.status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    == Some(INSTALL_PLAN_REQUIRES_APPROVAL)
            })
            .collect())
    }

    /// Merge `patch` into the Subscription.
    pub async fn patch(&self, ctx: &TestContext, patch: &serde_json::Value) -> Result<()> {
        merge_patch(ctx, KIND, &self.name, &self.namespace, patch).await?;
        Ok(())
    }

    pub async fn update_channel(&mut self, ctx: &TestContext, channel: &str) -> Result<()> {
        self.patch(ctx, &json!({"spec": {"channel": channel}})).await?;
        ctx.info(format!("moved subscription {} to channel {channel}", self.name));
        self.channel = channel.to_string();
        Ok(())
    }

    pub async fn delete(&self, ctx: &mut TestContext) -> Result<()> {
        ctx.untrack(&self.key()).await?;
        Ok(())
    }

    /// Delete the installed CSV, if one was recorded.
    pub async fn delete_csv(&mut self, ctx: &mut TestContext) -> Result<()> {
        if let Some(csv) = self.installed_csv.take() {
            ctx.untrack(&ResourceKey::new(csv, Csv::KIND, &self.namespace))
                .await?;
        }
        Ok(())
    }
}

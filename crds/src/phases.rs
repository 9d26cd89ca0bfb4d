// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

pub const SUBSCRIPTION_AT_LATEST_KNOWN: &str = "AtLatestKnown";
pub const SUBSCRIPTION_UPGRADE_PENDING: &str = "UpgradePending";
pub const SUBSCRIPTION_UPGRADE_FAILED: &str = "UpgradeFailed";

pub const INSTALL_PLAN_COMPLETE: &str = "Complete";
pub const INSTALL_PLAN_REQUIRES_APPROVAL: &str = "RequiresApproval";

pub const CSV_SUCCEEDED: &str = "Succeeded";

pub const CATALOG_SOURCE_READY: &str = "READY";

//! Core data types for the survey service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Feature importance ratings, one integer per feature area.
///
/// No range is enforced; ratings are stored exactly as submitted. Missing
/// ratings deserialize as 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Features {
    pub offline: i64,
    pub collaboration: i64,
    pub asset_management: i64,
    pub pdf_handling: i64,
    pub version_control: i64,
    pub workflows: i64,
}

/// Free-text survey answers that are stored verbatim and never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SurveyDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biggest_frustrations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specific_problems: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platforms: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cms_preference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wished_features: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_importance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaboration_frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing_sensitivity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_importance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_types: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_formats: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_suggestions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excitement_factors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaboration_challenges: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline_work_frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline_workarounds: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_change_conflict_handling: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_control_challenges: Option<String>,
}

impl SurveyDetails {
    /// Column names in the same order as [`SurveyDetails::values`].
    pub const COLUMNS: [&'static str; 23] = [
        "biggest_frustrations",
        "specific_problems",
        "usage_frequency",
        "primary_purpose",
        "platforms",
        "cms_preference",
        "wished_features",
        "workflow_importance",
        "team_size",
        "collaboration_frequency",
        "pricing_sensitivity",
        "pricing_model",
        "integrations",
        "integration_importance",
        "content_types",
        "custom_formats",
        "feedback_suggestions",
        "excitement_factors",
        "collaboration_challenges",
        "offline_work_frequency",
        "offline_workarounds",
        "current_change_conflict_handling",
        "version_control_challenges",
    ];

    pub fn values(&self) -> [&Option<String>; 23] {
        [
            &self.biggest_frustrations,
            &self.specific_problems,
            &self.usage_frequency,
            &self.primary_purpose,
            &self.platforms,
            &self.cms_preference,
            &self.wished_features,
            &self.workflow_importance,
            &self.team_size,
            &self.collaboration_frequency,
            &self.pricing_sensitivity,
            &self.pricing_model,
            &self.integrations,
            &self.integration_importance,
            &self.content_types,
            &self.custom_formats,
            &self.feedback_suggestions,
            &self.excitement_factors,
            &self.collaboration_challenges,
            &self.offline_work_frequency,
            &self.offline_workarounds,
            &self.current_change_conflict_handling,
            &self.version_control_challenges,
        ]
    }

    /// Rebuild from values ordered like [`SurveyDetails::COLUMNS`].
    pub fn from_values(values: [Option<String>; 23]) -> Self {
        let [
            biggest_frustrations,
            specific_problems,
            usage_frequency,
            primary_purpose,
            platforms,
            cms_preference,
            wished_features,
            workflow_importance,
            team_size,
            collaboration_frequency,
            pricing_sensitivity,
            pricing_model,
            integrations,
            integration_importance,
            content_types,
            custom_formats,
            feedback_suggestions,
            excitement_factors,
            collaboration_challenges,
            offline_work_frequency,
            offline_workarounds,
            current_change_conflict_handling,
            version_control_challenges,
        ] = values;

        Self {
            biggest_frustrations,
            specific_problems,
            usage_frequency,
            primary_purpose,
            platforms,
            cms_preference,
            wished_features,
            workflow_importance,
            team_size,
            collaboration_frequency,
            pricing_sensitivity,
            pricing_model,
            integrations,
            integration_importance,
            content_types,
            custom_formats,
            feedback_suggestions,
            excitement_factors,
            collaboration_challenges,
            offline_work_frequency,
            offline_workarounds,
            current_change_conflict_handling,
            version_control_challenges,
        }
    }
}

/// The answers a respondent submits, before the server assigns identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SurveySubmission {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_role: Option<String>,
    pub cms_usage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_cms_usage: Option<String>,
    pub features: Features,
    pub beta_interest: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub details: SurveyDetails,
}

/// A stored questionnaire: the submission plus server-assigned id and time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponse {
    pub id: String,
    #[serde(flatten)]
    pub submission: SurveySubmission,
    pub created_at: DateTime<Utc>,
}

/// Mean rating per feature area, rounded to two decimals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureAverages {
    pub offline: f64,
    pub collaboration: f64,
    pub asset_management: f64,
    pub pdf_handling: f64,
    pub version_control: f64,
    pub workflows: f64,
}

/// Aggregate summary over every stored response.
///
/// Grouped counts key rows with a NULL column under the empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyMetrics {
    pub total_responses: i64,
    pub beta_interest_count: i64,
    pub average_feature_scores: FeatureAverages,
    pub usage_frequency_stats: BTreeMap<String, i64>,
    pub team_size_distribution: BTreeMap<String, i64>,
    pub pricing_preferences: BTreeMap<String, i64>,
}

/// Body of `POST /login`. Missing fields read as empty and fail the
/// credential check like any other mismatch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Status shared by every routing resource kind.
///
/// The resolver only ever writes `validity`; other writers may own sibling
/// fields, which are preserved through deserialization.
#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct RoutingStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity: Option<Validity>,

    #[serde(flatten)]
    #[schemars(skip)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct Validity {
    /// One of `Valid`, `Invalid`, or `Orphaned`.
    pub state: String,

    pub observed_generation: i64,

    #[serde(default)]
    pub conditions: Vec<ValidityCondition>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidityCondition {
    /// One of `Info`, `Warning`, or `Error`.
    pub severity: String,
    pub reason: String,
    pub message: String,
}

//! Profile entity model.

use sea_orm::entity::prelude::*;

/// An application profile, 1:1 with an authenticated identity.
///
/// The primary key is the identity id itself, which is what makes
/// create-or-ignore provisioning safe under concurrent sign-ins.
///
/// # Database Schema
///
/// | Column               | Type               | Description                         |
/// |----------------------|--------------------|-------------------------------------|
/// | id                   | TEXT (Primary Key) | Identity id                         |
/// | email                | TEXT               | Email of the identity               |
/// | display_name         | TEXT NULL          | Full name given at sign-up          |
/// | company              | TEXT NULL          | Company given at sign-up            |
/// | subscription_plan_id | TEXT               | Plan id, `"free"` unless upgraded   |
/// | created_at           | TIMESTAMPTZ        | Provisioning time                   |
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub company: Option<String>,
    pub subscription_plan_id: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::subscription_plan::Entity",
        from = "Column::SubscriptionPlanId",
        to = "super::subscription_plan::Column::Id"
    )]
    SubscriptionPlan,
}

impl Related<super::subscription_plan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SubscriptionPlan.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

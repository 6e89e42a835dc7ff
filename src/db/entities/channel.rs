use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::ChannelType;

/// Generic channel envelope. The type-specific settings live in exactly one of
/// `channel_email`, `channel_slack` or `channel_webhook`, keyed by this id.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "channels")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub channel_type: ChannelType,
    pub name: String,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    User,
    #[sea_orm(has_one = "super::channel_email::Entity")]
    Email,
    #[sea_orm(has_one = "super::channel_slack::Entity")]
    Slack,
    #[sea_orm(has_one = "super::channel_webhook::Entity")]
    WebHook,
    #[sea_orm(has_many = "super::job_alert::Entity")]
    JobAlerts,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::channel_email::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Email.def()
    }
}

impl Related<super::channel_slack::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Slack.def()
    }
}

impl Related<super::channel_webhook::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WebHook.def()
    }
}

impl Related<super::job_alert::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::JobAlerts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! Idempotency result entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "oncely_result")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub result_key: String,
    #[sea_orm(column_type = "Blob")]
    pub value: Vec<u8>,
    pub expires_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use axum::{
    extract::{Query, State},
    Json,
};
use bson::oid::ObjectId;
use mongodb::options::FindOptions;
use serde::{Deserialize, Serialize};

use crate::{error::Error, mongo_ext::Collection, util::ObjectIdString};

#[derive(Clone)]
pub struct DistrictCollection(pub Collection<DistrictModel>);

impl std::ops::Deref for DistrictCollection {
    type Target = Collection<DistrictModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Clone)]
pub struct UpazilaCollection(pub Collection<UpazilaModel>);

impl std::ops::Deref for UpazilaCollection {
    type Target = Collection<UpazilaModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Static reference geography, seeded out of band and never written by
/// this service.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DistrictModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// key the seed data uses for the upazila foreign key
    pub district_id: String,
    pub name: String,
    pub bn_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpazilaModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub district_id: String,
    pub name: String,
    pub bn_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DistrictResponse {
    pub id: ObjectIdString,
    pub district_id: String,
    pub name: String,
    pub bn_name: String,
}

impl From<DistrictModel> for DistrictResponse {
    fn from(value: DistrictModel) -> Self {
        Self {
            id: value.id.into(),
            district_id: value.district_id,
            name: value.name,
            bn_name: value.bn_name,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpazilaResponse {
    pub id: ObjectIdString,
    pub district_id: String,
    pub name: String,
    pub bn_name: String,
}

impl From<UpazilaModel> for UpazilaResponse {
    fn from(value: UpazilaModel) -> Self {
        Self {
            id: value.id.into(),
            district_id: value.district_id,
            name: value.name,
            bn_name: value.bn_name,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DistrictIndexResponse {
    pub districts: Vec<DistrictResponse>,
}

pub async fn districts(
    State(districts): State<DistrictCollection>,
) -> Result<Json<DistrictIndexResponse>, Error> {
    let options = FindOptions::builder()
        .sort(bson::doc! { "name": 1 })
        .build();

    let mut cursor = districts.find(None, options).await?;

    let mut result = vec![];

    while cursor.advance().await? {
        let district = cursor.deserialize_current()?;

        result.push(district.into());
    }

    Ok(Json(DistrictIndexResponse { districts: result }))
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpazilaQuery {
    pub district_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpazilaIndexResponse {
    pub upazilas: Vec<UpazilaResponse>,
}

/// `GET /upazilas?district_id=X`: only records whose `district_id` equals
/// `X`; empty set when none match.
pub async fn upazilas(
    State(upazilas): State<UpazilaCollection>,
    Query(query): Query<UpazilaQuery>,
) -> Result<Json<UpazilaIndexResponse>, Error> {
    let mut filter = bson::doc! {};
    if let Some(district_id) = query.district_id {
        filter.insert("district_id", district_id);
    }

    let options = FindOptions::builder()
        .sort(bson::doc! { "name": 1 })
        .build();

    let mut cursor = upazilas.find(filter, options).await?;

    let mut result = vec![];

    while cursor.advance().await? {
        let upazila = cursor.deserialize_current()?;

        result.push(upazila.into());
    }

    Ok(Json(UpazilaIndexResponse { upazilas: result }))
}

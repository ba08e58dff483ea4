use axum::extract::FromRef;

use crate::api::v1::{
    blog::BlogCollection,
    donation::DonationRequestCollection,
    geo::{DistrictCollection, UpazilaCollection},
    payment::{PaymentCollection, StripeClient},
    token::JwtState,
    user::UserCollection,
};
use crate::migrate::MigrationCollection;

#[derive(FromRef, Clone)]
pub struct AppState {
    pub jwt_state: JwtState,
    pub stripe: StripeClient,

    pub mongo_client: mongodb::Client,
    pub migrate_collection: MigrationCollection,
    pub user_collection: UserCollection,
    pub donation_request_collection: DonationRequestCollection,
    pub blog_collection: BlogCollection,
    pub payment_collection: PaymentCollection,
    pub district_collection: DistrictCollection,
    pub upazila_collection: UpazilaCollection,
}

impl AppState {
    pub async fn new(
        mongo_url: &str,
        database_name: &str,
        jwt_state: JwtState,
        stripe: StripeClient,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mongo_client_opt = mongodb::options::ClientOptions::parse(mongo_url).await?;
        let mongo_client = mongodb::Client::with_options(mongo_client_opt)?;

        let db = mongo_client.database(database_name);
        Ok(Self {
            jwt_state,
            stripe,

            mongo_client,
            migrate_collection: MigrationCollection(db.collection("migrations").into()),
            user_collection: UserCollection(db.collection("all-users").into()),
            donation_request_collection: DonationRequestCollection(
                db.collection("donationReq").into(),
            ),
            blog_collection: BlogCollection(db.collection("blogs").into()),
            payment_collection: PaymentCollection(db.collection("payments").into()),
            district_collection: DistrictCollection(db.collection("districts").into()),
            upazila_collection: UpazilaCollection(db.collection("upazilas").into()),
        })
    }

    pub async fn new_from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mongodb_url = &std::env::var("MONGODB_URI")
            .expect("Cannot retreive MONGODB_URI from environment variable.");

        Self::new(
            mongodb_url,
            "needblood",
            JwtState::new_from_env(),
            StripeClient::new_from_env(),
        )
        .await
    }
}

pub mod auth;
pub mod blog;
pub mod donation;
pub mod geo;
pub mod payment;
pub mod token;
pub mod user;

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::extract::{Path, Query, State};
    use axum::Json;
    use bson::oid::ObjectId;
    use time::{Duration, OffsetDateTime};

    use crate::app::AppState;
    use crate::error::Error;
    use crate::util::{Pagination, PathObjectId};

    use super::auth::Session;
    use super::donation::{self, DonationRequestCollection, DonationStatus, DonationStatusFilter};
    use super::geo::{self, UpazilaCollection, UpazilaModel, UpazilaQuery};
    use super::payment::{self, PaymentCollection, StripeClient};
    use super::token::JwtState;
    use super::user::{self, UserCollection, UserModel, UserRole, UserStatus};

    pub struct Bootstrap {
        pub app_state: AppState,
        user_model: UserModel,
    }

    impl Bootstrap {
        pub fn users(&self) -> State<UserCollection> {
            State(self.app_state.user_collection.clone())
        }

        pub fn donation_requests(&self) -> State<DonationRequestCollection> {
            State(self.app_state.donation_request_collection.clone())
        }

        pub fn payments(&self) -> State<PaymentCollection> {
            State(self.app_state.payment_collection.clone())
        }

        pub fn upazilas(&self) -> State<UpazilaCollection> {
            State(self.app_state.upazila_collection.clone())
        }

        pub fn user_model(&self) -> UserModel {
            self.user_model.clone()
        }

        pub fn user_email(&self) -> String {
            self.user_model.email.clone()
        }

        pub fn session(&self) -> Session {
            Session {
                email: self.user_model.email.clone(),
            }
        }

        pub async fn derive(&self, email: &str, role: UserRole, status: UserStatus) -> Bootstrap {
            let user = create_user(&self.app_state, email, role, status).await;

            Bootstrap {
                app_state: self.app_state.clone(),
                user_model: user,
            }
        }
    }

    pub async fn create_user(
        app: &AppState,
        email: &str,
        role: UserRole,
        status: UserStatus,
    ) -> UserModel {
        let model = UserModel {
            id: ObjectId::new(),
            name: email.split('@').next().unwrap().to_string(),
            email: email.to_string(),
            avatar: None,
            blood_group: "A+".to_string(),
            district: "Dhaka".to_string(),
            upazila: "Dhanmondi".to_string(),
            role,
            status,
            created_at: OffsetDateTime::now_utc().into(),
            updated_at: OffsetDateTime::now_utc().into(),
        };

        app.user_collection.insert_one(&model, None).await.unwrap();

        model
    }

    pub async fn bootstrap() -> Bootstrap {
        dotenvy::dotenv().ok();
        let mongodb_url = &std::env::var("MONGODB_URI")
            .expect("Cannot retreive MONGODB_URI from environment variable.");

        let database_name = format!("needblood-test-{}", ObjectId::new());
        let app_state = AppState::new(
            mongodb_url,
            &database_name,
            JwtState::new(b"test-secret"),
            StripeClient::new("sk_test_unused".to_string()),
        )
        .await
        .unwrap();

        let user = create_user(
            &app_state,
            "admin@example.com",
            UserRole::Admin,
            UserStatus::Active,
        )
        .await;

        Bootstrap {
            app_state,
            user_model: user,
        }
    }

    fn sample_request() -> donation::CreateRequest {
        donation::CreateRequest {
            recipient_name: "recipient".to_string(),
            blood_group: "B+".to_string(),
            district: "Dhaka".to_string(),
            upazila: "Dhanmondi".to_string(),
            hospital_name: "Dhaka Medical College Hospital".to_string(),
            full_address: "Secretariat Road, Dhaka".to_string(),
            donation_date: "2024-06-01".to_string(),
            donation_time: "10:30".to_string(),
            request_message: "urgent".to_string(),
        }
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (set MONGODB_URI)"]
    async fn test_register_is_idempotent() {
        let bootstrap = bootstrap().await;

        let request = user::RegisterRequest {
            name: "name".to_string(),
            email: "donor@example.com".to_string(),
            avatar: None,
            blood_group: "O-".to_string(),
            district: "Dhaka".to_string(),
            upazila: "Dhanmondi".to_string(),
        };

        let Json(first) = user::register(bootstrap.users(), Json(request.clone()))
            .await
            .unwrap();
        assert!(first.inserted_id.is_some());

        let Json(second) = user::register(bootstrap.users(), Json(request))
            .await
            .unwrap();
        assert!(second.inserted_id.is_none());
        assert_eq!(second.message, "user already exists");

        let count = bootstrap
            .app_state
            .user_collection
            .count_documents(bson::doc! { "email": "donor@example.com" }, None)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (set MONGODB_URI)"]
    async fn test_blocked_user_cannot_create_donation_request() {
        let bootstrap = bootstrap()
            .await
            .derive("blocked@example.com", UserRole::Donor, UserStatus::Blocked)
            .await;

        let Json(response) = donation::create(
            bootstrap.donation_requests(),
            bootstrap.user_model(),
            Json(sample_request()),
        )
        .await
        .unwrap();

        assert!(response.inserted_id.is_none());

        let count = bootstrap
            .app_state
            .donation_request_collection
            .count_documents(bson::doc! {}, None)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (set MONGODB_URI)"]
    async fn test_requests_are_listed_most_recent_first() {
        let bootstrap = bootstrap()
            .await
            .derive("donor@example.com", UserRole::Donor, UserStatus::Active)
            .await;

        // spread created_at out so the ordering cannot tie
        for minutes in [30, 10, 20] {
            let Json(created) = donation::create(
                bootstrap.donation_requests(),
                bootstrap.user_model(),
                Json(sample_request()),
            )
            .await
            .unwrap();

            let created_at = OffsetDateTime::now_utc() - Duration::minutes(minutes);
            bootstrap
                .app_state
                .donation_request_collection
                .update_one_by_id(
                    created.inserted_id.unwrap().0,
                    bson::doc! { "$set": { "created_at": bson::DateTime::from(created_at) } },
                )
                .await
                .unwrap();
        }

        let Json(index) = donation::index_by_requester(
            bootstrap.donation_requests(),
            bootstrap.user_model(),
            Path(bootstrap.user_email()),
            Query(DonationStatusFilter::default()),
            Query(Pagination::default()),
        )
        .await
        .unwrap();

        assert_eq!(index.requests.len(), 3);
        for window in index.requests.windows(2) {
            assert!(window[0].created_at.0 > window[1].created_at.0);
        }
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (set MONGODB_URI)"]
    async fn test_claim_conflicts_when_not_pending() {
        let bootstrap = bootstrap()
            .await
            .derive("donor@example.com", UserRole::Donor, UserStatus::Active)
            .await;

        let Json(created) = donation::create(
            bootstrap.donation_requests(),
            bootstrap.user_model(),
            Json(sample_request()),
        )
        .await
        .unwrap();
        let id = created.inserted_id.unwrap().0;

        let volunteer = bootstrap
            .derive("helper@example.com", UserRole::Donor, UserStatus::Active)
            .await;

        let Json(claimed) = donation::claim(
            bootstrap.donation_requests(),
            volunteer.user_model(),
            PathObjectId(id),
        )
        .await
        .unwrap();
        assert_eq!(claimed.status, DonationStatus::InProgress);

        let error = donation::claim(
            bootstrap.donation_requests(),
            volunteer.user_model(),
            PathObjectId(id),
        )
        .await
        .unwrap_err();
        assert_matches!(error, Error::Conflict(_));

        // status is unchanged after the rejected claim
        let model = bootstrap
            .app_state
            .donation_request_collection
            .get_one_by_id(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(model.status, DonationStatus::InProgress);
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (set MONGODB_URI)"]
    async fn test_user_index_requires_admin() {
        let bootstrap = bootstrap().await;

        let donor = bootstrap
            .derive("donor@example.com", UserRole::Donor, UserStatus::Active)
            .await;

        let error = user::index(
            bootstrap.users(),
            donor.user_model(),
            Query(Default::default()),
            Query(Pagination::default()),
        )
        .await
        .unwrap_err();
        assert_matches!(error, Error::Forbidden);

        user::index(
            bootstrap.users(),
            bootstrap.user_model(),
            Query(Default::default()),
            Query(Pagination::default()),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (set MONGODB_URI)"]
    async fn test_role_route_denies_other_email() {
        let bootstrap = bootstrap().await;

        let error = user::role(
            bootstrap.users(),
            bootstrap.session(),
            Path("other@example.com".to_string()),
        )
        .await
        .unwrap_err();
        assert_matches!(error, Error::Forbidden);

        let Json(response) = user::role(
            bootstrap.users(),
            bootstrap.session(),
            Path(bootstrap.user_email()),
        )
        .await
        .unwrap();
        assert_eq!(response.role, UserRole::Admin);
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (set MONGODB_URI)"]
    async fn test_payment_total_matches_ledger() {
        let bootstrap = bootstrap().await;

        let total = payment::total_collected(&bootstrap.app_state.payment_collection)
            .await
            .unwrap();
        assert_eq!(total, 0.0);

        for amount in [25.5, 10.0, 4.5] {
            payment::record(
                bootstrap.payments(),
                bootstrap.user_model(),
                Json(payment::RecordPaymentRequest {
                    amount,
                    transaction_id: None,
                }),
            )
            .await
            .unwrap();
        }

        let total = payment::total_collected(&bootstrap.app_state.payment_collection)
            .await
            .unwrap();
        assert_eq!(total, 40.0);
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB (set MONGODB_URI)"]
    async fn test_upazilas_filtered_by_district() {
        let bootstrap = bootstrap().await;

        for (district_id, name) in [("1", "Dhanmondi"), ("1", "Gulshan"), ("2", "Sadar")] {
            bootstrap
                .app_state
                .upazila_collection
                .insert_one(
                    UpazilaModel {
                        id: ObjectId::new(),
                        district_id: district_id.to_string(),
                        name: name.to_string(),
                        bn_name: name.to_string(),
                    },
                    None,
                )
                .await
                .unwrap();
        }

        let Json(response) = geo::upazilas(
            bootstrap.upazilas(),
            Query(UpazilaQuery {
                district_id: Some("1".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.upazilas.len(), 2);
        assert!(response.upazilas.iter().all(|it| it.district_id == "1"));

        let Json(response) = geo::upazilas(
            bootstrap.upazilas(),
            Query(UpazilaQuery {
                district_id: Some("404".to_string()),
            }),
        )
        .await
        .unwrap();
        assert!(response.upazilas.is_empty());
    }
}

//! Service tests against a real PostgreSQL database.
//!
//! `#[sqlx::test]` creates a fresh database per test and applies
//! `./migrations`. Run with `DATABASE_URL` set and `cargo test -- --ignored`.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use spotlink_api::{
    error::AppError,
    models::{
        notification::{self, NewNotification, TYPE_RESERVATION_REMINDER},
        pagination::{Filters, ListQuery},
        parking_lot::{CreateParkingLotRequest, ParkingLot},
        parking_session::{CreateSessionRequest, ParkingSession},
        parking_spot::{CreateParkingSpotRequest, ParkingSpot},
        qr_code::GenerateQrCodeRequest,
        reservation::{CreateReservationRequest, Reservation, UpdateReservationRequest},
        token::SCOPE_AUTHENTICATION,
        user::{CompleteProfileRequest, RegisterUserRequest, User},
        vehicle::{CreateVehicleRequest, Vehicle},
    },
    services::{
        notification_service, parking_lot_service, parking_spot_service,
        qr_service::{self, QrSettings},
        reservation_service, session_service, user_service, vehicle_service,
    },
};
use url::Url;
use uuid::Uuid;

async fn register(pool: &PgPool, name: &str) -> User {
    let (user, _activation) = user_service::register(
        pool,
        RegisterUserRequest {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password: "correct horse battery".to_string(),
        },
    )
    .await
    .unwrap();
    user
}

async fn add_vehicle(pool: &PgPool, user: &User, plate: &str) -> Vehicle {
    vehicle_service::create(
        pool,
        user.id,
        CreateVehicleRequest {
            license_plate: plate.to_string(),
            make: "Toyota".to_string(),
            model: "Corolla".to_string(),
            color: "Blue".to_string(),
            vehicle_type: "car".to_string(),
            is_default: true,
        },
    )
    .await
    .unwrap()
}

fn qr_settings() -> QrSettings {
    let storage_dir = std::env::temp_dir().join(format!("spotlink-db-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&storage_dir).unwrap();
    QrSettings {
        storage_dir,
        verify_base_url: Url::parse("https://spotlinkio.com/verify").unwrap(),
    }
}

async fn lot_with_spot(pool: &PgPool, owner: &User) -> (ParkingLot, ParkingSpot) {
    let lot = parking_lot_service::create(
        pool,
        owner.id,
        CreateParkingLotRequest {
            name: "Downtown Garage".to_string(),
            address: "1 Main St".to_string(),
            latitude: 40.7128,
            longitude: -74.0060,
            total_spots: 10,
            hourly_rate_cents: 500,
            daily_rate_cents: None,
            monthly_rate_cents: None,
            open_time: "06:00:00".parse().unwrap(),
            close_time: "22:00:00".parse().unwrap(),
        },
    )
    .await
    .unwrap();
    let spot = parking_spot_service::create(
        pool,
        lot.id,
        CreateParkingSpotRequest {
            spot_number: "A1".to_string(),
            spot_type: "regular".to_string(),
        },
    )
    .await
    .unwrap();
    (lot, spot)
}

fn booking(lot: &ParkingLot, spot: &ParkingSpot, vehicle: &Vehicle) -> CreateReservationRequest {
    let start_time = Utc::now() + Duration::hours(1);
    CreateReservationRequest {
        vehicle_id: vehicle.id,
        parking_lot_id: lot.id,
        parking_spot_id: Some(spot.id),
        start_time,
        end_time: start_time + Duration::minutes(90),
    }
}

async fn spot_flags(pool: &PgPool, spot: &ParkingSpot) -> (bool, bool) {
    sqlx::query_as("SELECT is_reserved, is_occupied FROM parking_spots WHERE id = $1")
        .bind(spot.id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn parking_request(vehicle: &Vehicle) -> GenerateQrCodeRequest {
    GenerateQrCodeRequest {
        vehicle_id: vehicle.id,
        expiry_hours: 24,
        purpose: "parking".to_string(),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_update_increments_version_and_rejects_stale_writes(pool: PgPool) {
    let user = register(&pool, "driver").await;
    let mut vehicle = add_vehicle(&pool, &user, "ABC123").await;
    assert_eq!(vehicle.version, 1);
    let created_at = vehicle.updated_at;

    vehicle.color = "Red".to_string();
    let stamp = vehicle_service::update(&pool, &vehicle, 1).await.unwrap();
    assert_eq!(stamp.version, 2);
    assert!(stamp.updated_at > created_at);

    // Second writer still holds version 1
    vehicle.color = "Green".to_string();
    let err = vehicle_service::update(&pool, &vehicle, 1).await.unwrap_err();
    assert!(matches!(err, AppError::EditConflict));

    let stored = vehicle_service::get(&pool, user.id, vehicle.id).await.unwrap();
    assert_eq!(stored.color, "Red");
    assert_eq!(stored.version, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_concurrent_updates_with_same_version_have_one_winner(pool: PgPool) {
    let user = register(&pool, "racer").await;
    let vehicle = add_vehicle(&pool, &user, "RACE01").await;

    let mut first = vehicle.clone();
    first.make = "Honda".to_string();
    let mut second = vehicle.clone();
    second.make = "Mazda".to_string();

    let (a, b) = tokio::join!(
        vehicle_service::update(&pool, &first, vehicle.version),
        vehicle_service::update(&pool, &second, vehicle.version),
    );

    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let stored = vehicle_service::get(&pool, user.id, vehicle.id).await.unwrap();
    assert_eq!(stored.version, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_duplicate_license_plate_is_a_conflict(pool: PgPool) {
    let alice = register(&pool, "alice").await;
    let bob = register(&pool, "bob").await;
    add_vehicle(&pool, &alice, "SAME1").await;

    let err = vehicle_service::create(
        &pool,
        bob.id,
        CreateVehicleRequest {
            license_plate: "SAME1".to_string(),
            make: "Ford".to_string(),
            model: "Focus".to_string(),
            color: "White".to_string(),
            vehicle_type: "car".to_string(),
            is_default: false,
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::Duplicate(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_issuing_a_code_deactivates_the_previous_one(pool: PgPool) {
    let settings = qr_settings();
    let user = register(&pool, "holder").await;
    let vehicle = add_vehicle(&pool, &user, "QR0001").await;

    let first = qr_service::issue(&pool, &settings, user.id, parking_request(&vehicle))
        .await
        .unwrap();
    let first_image = qr_service::image_filename(&first.qr_code.code);
    assert!(settings.storage_dir.join(&first_image).exists());

    // Verifies to exactly the snapshot taken at issuance
    let data = qr_service::verify(&pool, &first.qr_code.code).await.unwrap();
    assert_eq!(data, first.qr_data);

    let second = qr_service::issue(&pool, &settings, user.id, parking_request(&vehicle))
        .await
        .unwrap();

    assert_ne!(first.qr_code.code, second.qr_code.code);
    assert_eq!(second.qr_code.code.len(), qr_service::CODE_LENGTH);

    let active = qr_service::list_active(&pool, user.id).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second.qr_code.id);

    let err = qr_service::verify(&pool, &first.qr_code.code).await.unwrap_err();
    assert!(matches!(err, AppError::NotFoundOrExpired(_)));
    assert_eq!(err.to_string(), "QR code not found or expired");
    assert!(!settings.storage_dir.join(&first_image).exists());

    let data = qr_service::verify(&pool, &second.qr_code.code).await.unwrap();
    assert_eq!(data, second.qr_data);
    assert_eq!(data.user_profile.email, "holder@example.com");
    assert_eq!(data.vehicle.license_plate, "QR0001");

    let png = qr_service::read_image(&settings, &qr_service::image_filename(&second.qr_code.code))
        .await
        .unwrap();
    assert!(png.starts_with(b"\x89PNG"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_expired_codes_stop_verifying_and_are_cleaned_up(pool: PgPool) {
    let settings = qr_settings();
    let user = register(&pool, "late").await;
    let vehicle = add_vehicle(&pool, &user, "QR0002").await;

    let issued = qr_service::issue(&pool, &settings, user.id, parking_request(&vehicle))
        .await
        .unwrap();

    sqlx::query("UPDATE qr_codes SET expires_at = NOW() - INTERVAL '1 minute' WHERE id = $1")
        .bind(issued.qr_code.id)
        .execute(&pool)
        .await
        .unwrap();

    let err = qr_service::verify(&pool, &issued.qr_code.code).await.unwrap_err();
    assert!(matches!(err, AppError::NotFoundOrExpired(_)));

    assert_eq!(qr_service::cleanup_expired(&pool, &settings).await.unwrap(), 1);
    assert_eq!(qr_service::cleanup_expired(&pool, &settings).await.unwrap(), 0);

    let image = settings
        .storage_dir
        .join(qr_service::image_filename(&issued.qr_code.code));
    assert!(!image.exists());

    let version: i32 = sqlx::query_scalar("SELECT version FROM qr_codes WHERE id = $1")
        .bind(issued.qr_code.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(version, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_a_spot_cannot_be_reserved_twice(pool: PgPool) {
    let owner = register(&pool, "owner").await;
    let (lot, spot) = lot_with_spot(&pool, &owner).await;

    let alice = register(&pool, "alice").await;
    let alice_car = add_vehicle(&pool, &alice, "ALICE1").await;
    let bob = register(&pool, "bob").await;
    let bob_car = add_vehicle(&pool, &bob, "BOB001").await;

    let reservation = reservation_service::create(&pool, alice.id, booking(&lot, &spot, &alice_car))
        .await
        .unwrap();
    // 90 minutes bill as two started hours
    assert_eq!(reservation.total_amount_cents, 1000);
    assert_eq!(reservation.status, "pending");

    let err = reservation_service::create(&pool, bob.id, booking(&lot, &spot, &bob_car))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Cancelling frees the spot for the next booking
    reservation_service::cancel(&pool, alice.id, reservation.id)
        .await
        .unwrap();
    reservation_service::create(&pool, bob.id, booking(&lot, &spot, &bob_car))
        .await
        .unwrap();
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_reservation_update_rejects_stale_version(pool: PgPool) {
    let owner = register(&pool, "owner").await;
    let (lot, spot) = lot_with_spot(&pool, &owner).await;
    let driver = register(&pool, "driver").await;
    let car = add_vehicle(&pool, &driver, "RES001").await;

    let mut stored = reservation_service::create(&pool, driver.id, booking(&lot, &spot, &car))
        .await
        .unwrap();
    assert_eq!(stored.version, 1);

    let extend = |stored: &Reservation, minutes: i64| {
        let mut updated = stored.clone();
        UpdateReservationRequest {
            version: stored.version,
            start_time: None,
            end_time: Some(stored.end_time + Duration::minutes(minutes)),
            parking_spot_id: Default::default(),
        }
        .apply(&mut updated);
        updated
    };

    // Two edits bring the row to version 3
    for _ in 0..2 {
        let updated = extend(&stored, 30);
        stored = reservation_service::update(&pool, &stored, &updated, stored.version)
            .await
            .unwrap();
    }
    assert_eq!(stored.version, 3);

    let updated = extend(&stored, 30);
    let current = reservation_service::update(&pool, &stored, &updated, 3)
        .await
        .unwrap();
    assert_eq!(current.version, 4);
    assert_eq!(current.end_time, updated.end_time);

    let stale = extend(&stored, 60);
    let err = reservation_service::update(&pool, &stored, &stale, 3)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EditConflict));

    let reloaded = reservation_service::get(&pool, driver.id, stored.id).await.unwrap();
    assert_eq!(reloaded.version, 4);
    assert_eq!(reloaded.end_time, current.end_time);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_cancelled_reservation_cannot_start_a_session(pool: PgPool) {
    let owner = register(&pool, "owner").await;
    let (lot, spot) = lot_with_spot(&pool, &owner).await;
    let alice = register(&pool, "alice").await;
    let alice_car = add_vehicle(&pool, &alice, "ALICE1").await;
    let bob = register(&pool, "bob").await;
    let bob_car = add_vehicle(&pool, &bob, "BOB001").await;

    let cancelled = reservation_service::create(&pool, alice.id, booking(&lot, &spot, &alice_car))
        .await
        .unwrap();
    reservation_service::cancel(&pool, alice.id, cancelled.id)
        .await
        .unwrap();
    let bobs = reservation_service::create(&pool, bob.id, booking(&lot, &spot, &bob_car))
        .await
        .unwrap();

    let err = session_service::create(
        &pool,
        alice.id,
        CreateSessionRequest {
            vehicle_id: alice_car.id,
            parking_spot_id: spot.id,
            reservation_id: Some(cancelled.id),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(spot_flags(&pool, &spot).await, (true, false));

    let session = session_service::create(
        &pool,
        bob.id,
        CreateSessionRequest {
            vehicle_id: bob_car.id,
            parking_spot_id: spot.id,
            reservation_id: Some(bobs.id),
        },
    )
    .await
    .unwrap();
    assert_eq!(session.status, "active");
    assert_eq!(spot_flags(&pool, &spot).await, (false, true));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_session_patch_only_corrects_completed_sessions(pool: PgPool) {
    let owner = register(&pool, "owner").await;
    let (_lot, spot) = lot_with_spot(&pool, &owner).await;
    let driver = register(&pool, "driver").await;
    let car = add_vehicle(&pool, &driver, "SES001").await;

    let session = session_service::create(
        &pool,
        driver.id,
        CreateSessionRequest {
            vehicle_id: car.id,
            parking_spot_id: spot.id,
            reservation_id: None,
        },
    )
    .await
    .unwrap();

    let corrected = |session: &ParkingSession| ParkingSession {
        check_out_time: Some(session.check_in_time + Duration::minutes(150)),
        ..session.clone()
    };

    // Still parked: only check-out may end it
    let err = session_service::update(&pool, &corrected(&session), session.version)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(spot_flags(&pool, &spot).await, (false, true));

    let completed = session_service::check_out(&pool, driver.id, session.id)
        .await
        .unwrap();
    assert_eq!(completed.status, "completed");
    assert!(completed.total_amount_cents.is_some());
    assert_eq!(spot_flags(&pool, &spot).await, (false, false));

    let updated = session_service::update(&pool, &corrected(&completed), completed.version)
        .await
        .unwrap();
    assert_eq!(updated.version, completed.version + 1);
    assert_eq!(updated.total_duration_minutes, Some(150));
    // 150 minutes bill as three started hours at 500
    assert_eq!(updated.total_amount_cents, Some(1500));

    let stored = session_service::get(&pool, driver.id, session.id).await.unwrap();
    assert_eq!(stored.status, "completed");
    assert_eq!(stored.total_amount_cents, Some(1500));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_activation_token_activates_once(pool: PgPool) {
    let (user, activation) = user_service::register(
        &pool,
        RegisterUserRequest {
            username: "newcomer".to_string(),
            email: "Newcomer@Example.com".to_string(),
            password: "correct horse battery".to_string(),
        },
    )
    .await
    .unwrap();
    assert!(!user.activated);
    assert_eq!(user.email, "newcomer@example.com");

    let activated = user_service::activate(&pool, &activation.plaintext)
        .await
        .unwrap();
    assert!(activated.activated);
    assert_eq!(activated.version, user.version + 1);

    let Err(AppError::Validation(errors)) =
        user_service::activate(&pool, &activation.plaintext).await
    else {
        panic!("a spent activation token must not work twice");
    };
    assert_eq!(errors.get("token"), Some("invalid or expired activation token"));

    // Activation tokens are not bearer tokens
    let found = user_service::get_for_token(&pool, SCOPE_AUTHENTICATION, &activation.plaintext)
        .await
        .unwrap();
    assert!(found.is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_password_reset_replaces_the_password(pool: PgPool) {
    let (user, activation) = user_service::register(
        &pool,
        RegisterUserRequest {
            username: "forgetful".to_string(),
            email: "forgetful@example.com".to_string(),
            password: "correct horse battery".to_string(),
        },
    )
    .await
    .unwrap();

    let Err(AppError::Validation(errors)) =
        user_service::request_password_reset(&pool, &user.email).await
    else {
        panic!("inactive accounts cannot reset their password");
    };
    assert_eq!(errors.get("email"), Some("user account must be activated"));

    let Err(AppError::Validation(errors)) =
        user_service::request_password_reset(&pool, "nobody@example.com").await
    else {
        panic!("unknown email must be rejected");
    };
    assert!(errors.get("email").is_some());

    user_service::activate(&pool, &activation.plaintext)
        .await
        .unwrap();
    let (_, reset) = user_service::request_password_reset(&pool, &user.email)
        .await
        .unwrap();

    user_service::reset_password(&pool, &reset.plaintext, "battery staple horse".to_string())
        .await
        .unwrap();

    let ttl = Duration::hours(1);
    let err = user_service::authenticate(
        &pool,
        &user.email,
        "correct horse battery",
        ttl,
        SCOPE_AUTHENTICATION,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));
    user_service::authenticate(
        &pool,
        &user.email,
        "battery staple horse",
        ttl,
        SCOPE_AUTHENTICATION,
    )
    .await
    .unwrap();

    let err = user_service::reset_password(&pool, &reset.plaintext, "another password".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_profile_can_be_completed_once(pool: PgPool) {
    let user = register(&pool, "onboarding").await;
    let request = || CompleteProfileRequest {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        mobile_number: None,
    };

    let completed = user_service::complete_profile(&pool, user.id, request())
        .await
        .unwrap();
    assert!(completed.has_completed_onboarding);
    assert_eq!(completed.first_name.as_deref(), Some("Ada"));
    assert_eq!(completed.version, user.version + 1);

    let err = user_service::complete_profile(&pool, user.id, request())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_bulk_insert_is_all_or_nothing(pool: PgPool) {
    let user = register(&pool, "notified").await;
    let reminder = |user_id| {
        NewNotification::new(
            user_id,
            TYPE_RESERVATION_REMINDER,
            "Reservation reminder",
            "Your reservation starts in 30 minutes",
        )
    };

    // Second row points at a user that does not exist
    let batch = [reminder(user.id), reminder(Uuid::new_v4())];
    let err = notification_service::bulk_insert(&pool, &batch).await.unwrap_err();
    assert!(matches!(err, AppError::Database(_)));
    assert_eq!(notification_service::unread_count(&pool, user.id).await.unwrap(), 0);

    let batch = [reminder(user.id), reminder(user.id)];
    let inserted = notification_service::bulk_insert(&pool, &batch).await.unwrap();
    assert_eq!(inserted.len(), 2);
    assert_eq!(notification_service::unread_count(&pool, user.id).await.unwrap(), 2);

    notification_service::mark_read(&pool, user.id, inserted[0].id)
        .await
        .unwrap();
    let filters =
        Filters::from_query(ListQuery::default(), "-created_at", notification::SORT_SAFELIST)
            .unwrap();
    let unread = notification_service::list(&pool, user.id, true, &filters)
        .await
        .unwrap();
    assert_eq!(unread.data.len(), 1);
    assert_eq!(unread.data[0].id, inserted[1].id);
}

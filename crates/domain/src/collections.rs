//! Names of the store collections written by the sagas.

pub const EXPERIENCE_BOOKINGS: &str = "experience_bookings";
pub const LODGING_BOOKINGS: &str = "lodging_bookings";
pub const TRANSPORT_BOOKINGS: &str = "transport_bookings";

pub const GUIDE_IDENTITIES: &str = "guide_identities";
pub const GUIDE_PROFILES: &str = "guides";
pub const GUIDE_VERIFICATIONS: &str = "guide_verifications";

/// The three booking leg collections.
pub const BOOKING_COLLECTIONS: [&str; 3] =
    [EXPERIENCE_BOOKINGS, LODGING_BOOKINGS, TRANSPORT_BOOKINGS];

/// Every collection the dashboards may observe.
pub const ALL: [&str; 6] = [
    EXPERIENCE_BOOKINGS,
    LODGING_BOOKINGS,
    TRANSPORT_BOOKINGS,
    GUIDE_IDENTITIES,
    GUIDE_PROFILES,
    GUIDE_VERIFICATIONS,
];

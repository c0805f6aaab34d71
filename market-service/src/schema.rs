diesel::table! {
    listings (id) {
        id -> BigInt,
        owner_id -> BigInt,
        commodity -> Text,
        quantity -> BigInt,
        price -> BigInt,
        condition -> Text,
        bag_type -> Text,
        deduction -> BigInt,
        created_at -> Timestamp,
    }
}

diesel::table! {
    bookings (id) {
        id -> BigInt,
        order_id -> Text,
        listing_id -> BigInt,
        buyer_id -> BigInt,
        quantity -> BigInt,
        status -> Text,
        reason -> Nullable<Text>,
        decision_at -> Nullable<Timestamp>,
        loaded_qty -> BigInt,
        loading_status -> Text,
        truck_status -> Text,
        loaded_at -> Nullable<Timestamp>,
        bill_document -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    stock_history (id) {
        id -> BigInt,
        listing_id -> BigInt,
        edited_by -> BigInt,
        old_price -> BigInt,
        new_price -> BigInt,
        old_quantity -> BigInt,
        new_quantity -> BigInt,
        changed_at -> Timestamp,
    }
}

diesel::joinable!(bookings -> listings (listing_id));
diesel::joinable!(stock_history -> listings (listing_id));

diesel::allow_tables_to_appear_in_same_query!(
    listings,
    bookings,
    stock_history,
);

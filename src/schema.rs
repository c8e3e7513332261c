// Mirrors the Supabase `sensordata` table. The table is owned by the ingestion
// side; this crate only reads from it.

diesel::table! {
    sensordata (id) {
        id -> Int8,
        created_at -> Timestamptz,
        mq135 -> Float8,
        temperature -> Float8,
        humidity -> Float8,
        aqi -> Int8,
    }
}

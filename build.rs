#[allow(unreachable_code)]
fn main() {
    #[cfg(not(feature = "backend-sql"))]
    return;

    // sqlx::migrate! embeds the migrations at compile time
    println!("cargo:rerun-if-changed=migrations");
}

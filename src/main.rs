#[actix_web::main]
async fn main() -> std::io::Result<()> {
    safety_vision_lib::run().await
}

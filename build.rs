use std::env;

fn main() {
    // 環境変数をコンパイル時に埋め込み
    // ENVIRONMENT環境変数に基づいて適切な.envファイルを読み込み
    let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    let env_file = match environment.as_str() {
        "production" => ".env.production",
        _ => ".env",
    };

    println!("cargo:rerun-if-env-changed=ENVIRONMENT");
    println!("cargo:rerun-if-changed={env_file}");

    // 環境変数ファイルを読み込み
    if dotenv::from_filename(env_file).is_ok() {
        println!("cargo:warning={env_file}ファイルを読み込みました");

        // ドキュメントストアの接続情報をコンパイル時定数として埋め込み
        if let Ok(store_url) = env::var("DOCUMENT_STORE_URL") {
            println!("cargo:rustc-env=EMBEDDED_DOCUMENT_STORE_URL={store_url}");
        }
        if let Ok(store_token) = env::var("DOCUMENT_STORE_TOKEN") {
            println!("cargo:rustc-env=EMBEDDED_DOCUMENT_STORE_TOKEN={store_token}");
        }
        if let Ok(share_base_url) = env::var("SHARE_BASE_URL") {
            println!("cargo:rustc-env=EMBEDDED_SHARE_BASE_URL={share_base_url}");
        }

        // 注意: EMBEDDED_ENVIRONMENTは設定しない
        // 実行時に.envファイルから環境変数を読み込むため
    } else {
        println!("cargo:warning={env_file}ファイルが見つかりません");
    }
}

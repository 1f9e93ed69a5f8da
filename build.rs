// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

// 构建脚本: 链接FFmpeg静态库依赖的系统库

/// Windows MSVC 下 ez-ffmpeg 静态链接需要的额外库
#[cfg(all(target_os = "windows", target_env = "msvc"))]
const WINDOWS_LINK_LIBS: &[&str] = &[
    "libmfx",   // Intel QSV 硬件解码
    "oleaut32", // DirectShow 摄像头枚举
    "vfw32",
    "strmiids",
    "secur32", // RTSP over TLS
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    for lib in WINDOWS_LINK_LIBS {
        println!("cargo:rustc-link-lib=dylib={}", lib);
    }
}

pub const MOVIE_NAME_TOKEN: &str = "[INSERT MOVIE NAME HERE]";
pub const RATIO_TOKEN: &str = "[INSERT RATIO HERE]";
pub const DOF_TOKEN: &str = "[INSERT DOF HERE]";

pub const DEFAULT_MOVIE_NAME: &str = "The Matrix";
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";
pub const DEFAULT_DEPTH_OF_FIELD: &str = "f/4";

pub const SET_PHOTO_TEMPLATE: &str = r#"【人物与面容】
核心人物： 以上传图片为唯一面部参考，100%精确重构该人物的面部骨骼结构、皮肤纹理、发型及神态。保留所有面部特征（如痣、细纹、独特的眼神等），确保其面部与参考图具有完美的同一性。
[INSERT MOVIE NAME HERE]主演： 呈现其于电影拍摄期间的样貌。
互动状态： 两人身着各自的戏服，在电影拍摄间隙，或是在监控监视器前讨论，或是在片场某角落闲聊。

【镜头与构图】
镜头： 专业人像摄影机模式拍摄 [INSERT DOF HERE]
构图： [INSERT RATIO HERE] 采用生活化、不拘谨的抓拍构图。

【灯光与色彩】
主光源： 完全遵循所选电影场景的环境光逻辑。
色彩风格： 电影风格的色调。

【服装与造型】
上传人物着装： 保持不变。
[INSERT MOVIE NAME HERE]主演着装： 符合剧中时代与角色。

【动作与场景】
核心动作： 电影拍摄被短暂打断。
关键元素： 画面中需明确可见电影拍摄现场的痕迹（摄影机、灯光架、麦克风杆、场记板、混乱的线缆等）。

【画面风格与细节】
细节： 模拟柯达Vision3 500T电影胶片质感，带有自然的银盐颗粒感。
画面氛围： 温暖、怀旧、充满人情味。

【最终画面感受总结】
一张超写实的幕后片场抓拍照，仿佛无意间闯入了拍摄现场。"#;

pub const POSTER_PROMPT: &str = "A cinematic, iconic movie poster for the movie \"{movie_name}\". Highly stylized, abstract, moody, suitable for a blurred background. No text.";

pub const EDIT_PROMPT: &str =
    "Apply this edit to the image: {instruction}. Maintain the cinematic, vintage aesthetic.";

pub const GENERATE_SYSTEM_PROMPT: &str =
    "Generate an image based on the prompt. CRITICAL: response be an image, NOT TEXT.";
pub const REFERENCE_SYSTEM_PROMPT: &str =
    "Use the attached photo as the face reference and generate an image based on the prompt. CRITICAL: response be an image, NOT TEXT.";
pub const EDIT_SYSTEM_PROMPT: &str =
    "Edit the image based on the prompt. CRITICAL: response be an image, NOT TEXT.";

/// (label, value) pairs offered for the output framing.
pub const ASPECT_RATIO_PRESETS: &[(&str, &str)] = &[
    ("抖音 9:16", "9:16"),
    ("小红书 3:4", "3:4"),
    ("B站 4:3", "4:3"),
    ("宽银幕 16:9", "16:9"),
];

pub const DEPTH_OF_FIELD_PRESETS: &[(&str, &str)] = &[
    ("浅景深 f/1.2", "f/1.2"),
    ("标准 f/4", "f/4"),
    ("深景深 f/11", "f/11"),
];
